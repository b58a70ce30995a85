//! Controller Acknowledgment State Machine
//!
//! Each controller buffers only a few commands, so at most one command may be
//! outstanding per controller. This tracks that handshake for a single controller.

use std::time::{Duration, Instant};

/// Handshake state of one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// Free to receive a command
    Idle,
    /// A command was written and its ACK has not arrived yet
    AwaitingAck,
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckEvent {
    /// A command is about to be written
    Sent,
    /// The controller printed `ACK`
    AckReceived,
    /// The ACK deadline passed
    Timeout,
    /// The link dropped while waiting
    ConnectionLost,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Command is now outstanding
    Sent,
    /// Outstanding command acknowledged
    Completed { elapsed: Duration },
    /// Outstanding command abandoned after the deadline
    TimedOut { elapsed: Duration },
    /// Outstanding command abandoned because the link dropped
    Abandoned,
    /// Event has no meaning in the current state
    Invalid { from: AckStatus, event: AckEvent },
}

/// Handshake tracker for one controller
#[derive(Debug, Clone)]
pub struct AckStateMachine {
    status: AckStatus,
    last_sent_at: Option<Instant>,
    ack_timeout: Duration,
}

impl AckStateMachine {
    /// Create a new state machine in Idle state
    pub fn new(ack_timeout: Duration) -> Self {
        Self {
            status: AckStatus::Idle,
            last_sent_at: None,
            ack_timeout,
        }
    }

    /// Get current state
    pub fn status(&self) -> AckStatus {
        self.status
    }

    pub fn is_idle(&self) -> bool {
        self.status == AckStatus::Idle
    }

    /// Time of the most recent write
    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    /// When the outstanding command times out, if there is one
    pub fn deadline(&self) -> Option<Instant> {
        match self.status {
            AckStatus::AwaitingAck => self.last_sent_at.map(|sent| sent + self.ack_timeout),
            AckStatus::Idle => None,
        }
    }

    /// Check if the outstanding command has reached its deadline
    pub fn is_timed_out(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: AckEvent, now: Instant) -> TransitionResult {
        use AckEvent::*;
        use AckStatus::*;

        match (self.status, event) {
            (Idle, Sent) => {
                self.status = AwaitingAck;
                self.last_sent_at = Some(now);
                TransitionResult::Sent
            }
            (AwaitingAck, AckReceived) => {
                self.status = Idle;
                TransitionResult::Completed {
                    elapsed: self.elapsed(now),
                }
            }
            (AwaitingAck, Timeout) => {
                self.status = Idle;
                TransitionResult::TimedOut {
                    elapsed: self.elapsed(now),
                }
            }
            (AwaitingAck, ConnectionLost) => {
                self.status = Idle;
                TransitionResult::Abandoned
            }
            // A second write while awaiting, or a stray ACK/timeout while idle
            (from, event) => TransitionResult::Invalid { from, event },
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        self.last_sent_at
            .map(|sent| now.saturating_duration_since(sent))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(8);

    #[test]
    fn test_initial_state() {
        let fsm = AckStateMachine::new(TIMEOUT);
        assert_eq!(fsm.status(), AckStatus::Idle);
        assert!(fsm.deadline().is_none());
        assert!(fsm.last_sent_at().is_none());
    }

    #[test]
    fn test_send_then_ack() {
        let mut fsm = AckStateMachine::new(TIMEOUT);
        let start = Instant::now();

        assert_eq!(fsm.process_event(AckEvent::Sent, start), TransitionResult::Sent);
        assert_eq!(fsm.status(), AckStatus::AwaitingAck);
        assert_eq!(fsm.deadline(), Some(start + TIMEOUT));

        let result = fsm.process_event(AckEvent::AckReceived, start + Duration::from_millis(700));
        assert_eq!(
            result,
            TransitionResult::Completed {
                elapsed: Duration::from_millis(700)
            }
        );
        assert!(fsm.is_idle());
    }

    #[test]
    fn test_second_send_rejected_while_awaiting() {
        let mut fsm = AckStateMachine::new(TIMEOUT);
        let start = Instant::now();

        fsm.process_event(AckEvent::Sent, start);
        let result = fsm.process_event(AckEvent::Sent, start + Duration::from_millis(10));
        assert!(matches!(
            result,
            TransitionResult::Invalid {
                from: AckStatus::AwaitingAck,
                event: AckEvent::Sent
            }
        ));
        // The original send time is kept
        assert_eq!(fsm.last_sent_at(), Some(start));
    }

    #[test]
    fn test_timeout_detection() {
        let mut fsm = AckStateMachine::new(TIMEOUT);
        let start = Instant::now();

        assert!(!fsm.is_timed_out(start + TIMEOUT));

        fsm.process_event(AckEvent::Sent, start);
        assert!(!fsm.is_timed_out(start + Duration::from_secs(7)));
        assert!(fsm.is_timed_out(start + TIMEOUT));

        let result = fsm.process_event(AckEvent::Timeout, start + TIMEOUT);
        assert_eq!(result, TransitionResult::TimedOut { elapsed: TIMEOUT });
        assert!(fsm.is_idle());
    }

    #[test]
    fn test_stray_ack_while_idle_is_ignored() {
        let mut fsm = AckStateMachine::new(TIMEOUT);
        let result = fsm.process_event(AckEvent::AckReceived, Instant::now());
        assert!(matches!(result, TransitionResult::Invalid { from: AckStatus::Idle, .. }));
        assert!(fsm.is_idle());
    }

    #[test]
    fn test_connection_lost_abandons_command() {
        let mut fsm = AckStateMachine::new(TIMEOUT);
        let start = Instant::now();

        fsm.process_event(AckEvent::Sent, start);
        assert_eq!(
            fsm.process_event(AckEvent::ConnectionLost, start),
            TransitionResult::Abandoned
        );
        assert!(fsm.is_idle());

        // Ready for the next command
        assert_eq!(fsm.process_event(AckEvent::Sent, start), TransitionResult::Sent);
    }
}
