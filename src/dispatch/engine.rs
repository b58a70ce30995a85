//! Motion dispatch engine
//!
//! Pulls scripts off the motion queue one at a time, routes each to the arm(s) it
//! moves, writes it, waits for every addressed controller to acknowledge (or time
//! out), then paces before the next script. Nothing here is fatal: bad scripts,
//! silent controllers and dropped links are logged and skipped.

use super::queue::MotionReceiver;
use crate::connection::{ControllerLink, LinkSignal};
use futures::future::join;
use signarm_shared::{
    classify, codec,
    state_machine::{AckEvent, AckStateMachine, TransitionResult},
    timing, Arm, MotionScript,
};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Timing configuration for the engine
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Give up on a controller's ACK after this long
    pub ack_timeout: Duration,
    /// Pause after a fingerspelled letter
    pub fingerspell_post_delay: Duration,
    /// Pause after a full sign
    pub sign_post_delay: Duration,
    /// How long to wait for the controllers to come up before dispatching
    pub startup_grace: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(timing::ACK_TIMEOUT_MS),
            fingerspell_post_delay: Duration::from_millis(timing::FINGERSPELL_POST_DELAY_MS),
            sign_post_delay: Duration::from_millis(timing::SIGN_POST_DELAY_MS),
            startup_grace: Duration::from_millis(timing::CONNECT_TIMEOUT_MS),
        }
    }
}

/// Counters for everything the engine did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Scripts written to at least one controller
    pub dispatched: u64,
    /// Controller writes that were acknowledged
    pub acknowledged: u64,
    /// Scripts discarded as malformed
    pub malformed: u64,
    /// Scripts dropped because no addressed controller was connected
    pub dropped: u64,
    /// ACK waits that ran out
    pub timeouts: u64,
    /// ACK waits cut short by a lost link
    pub abandoned: u64,
    /// Writes that failed and took the link down
    pub write_failures: u64,
    /// Late ACKs discarded before a new command
    pub stale_acks: u64,
}

/// What happened to one script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Malformed,
    Dropped,
}

/// How one controller's wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckOutcome {
    NotSent,
    Acked,
    TimedOut,
    Lost,
}

/// Per-controller state: the link and its handshake
struct ControllerState {
    link: ControllerLink,
    fsm: AckStateMachine,
}

/// The dispatch engine; owns both controller links exclusively
pub struct DispatchEngine {
    config: DispatchConfig,
    queue: MotionReceiver,
    controllers: [ControllerState; 2],
    stats: DispatchStats,
    shutdown: Option<watch::Receiver<bool>>,
}

impl DispatchEngine {
    /// Create an engine over the two controller links
    pub fn new(
        config: DispatchConfig,
        queue: MotionReceiver,
        left: ControllerLink,
        right: ControllerLink,
    ) -> Self {
        debug_assert_eq!(left.arm(), Arm::Left);
        debug_assert_eq!(right.arm(), Arm::Right);

        let controllers = [left, right].map(|link| ControllerState {
            link,
            fsm: AckStateMachine::new(config.ack_timeout),
        });

        Self {
            config,
            queue,
            controllers,
            stats: DispatchStats::default(),
            shutdown: None,
        }
    }

    /// Stop between scripts once the watched flag turns true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run until the queue closes or shutdown is requested
    pub async fn run(mut self) -> DispatchStats {
        let grace = self.config.startup_grace;
        let [left, right] = &mut self.controllers;
        let (left_up, right_up) = join(
            left.link.wait_connected(grace),
            right.link.wait_connected(grace),
        )
        .await;

        info!(
            "[DISPATCH] Engine started (LEFT {}, RIGHT {})",
            if left_up { "connected" } else { "offline" },
            if right_up { "connected" } else { "offline" }
        );

        while let Some(script) = self.next_script().await {
            if self.dispatch(&script).await != DispatchOutcome::Delivered {
                continue;
            }
            if let Some(delay) = self.post_delay(&script) {
                tokio::time::sleep(delay).await;
            }
        }

        info!("[DISPATCH] Engine stopped: {:?}", self.stats);
        self.stats
    }

    async fn next_script(&mut self) -> Option<MotionScript> {
        match self.shutdown.as_mut() {
            Some(shutdown) => tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => {
                    info!("[DISPATCH] Shutdown requested");
                    None
                }
                script = self.queue.dequeue() => script,
            },
            None => self.queue.dequeue().await,
        }
    }

    /// Pause owed after `script`, if more work is queued
    fn post_delay(&self, script: &MotionScript) -> Option<Duration> {
        if self.queue.is_empty() {
            return None;
        }
        if script.is_fingerspelled() {
            Some(self.config.fingerspell_post_delay)
        } else {
            Some(self.config.sign_post_delay)
        }
    }

    /// Route, write and wait for one script
    async fn dispatch(&mut self, script: &MotionScript) -> DispatchOutcome {
        if let Err(e) = script.validate() {
            self.stats.malformed += 1;
            warn!("[DISPATCH] Malformed script {:?} discarded: {}", script.token, e);
            return DispatchOutcome::Malformed;
        }

        let encoded = match codec::encode(script) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.stats.malformed += 1;
                warn!("[DISPATCH] Cannot encode {}: {}", script.token, e);
                return DispatchOutcome::Malformed;
            }
        };

        let assignment = classify(script);
        debug!("[DISPATCH] {} -> {}", script.token, assignment);

        // Writes go out back-to-back, LEFT first
        let mut sent = [false; 2];
        for arm in assignment.arms() {
            let ctrl = &mut self.controllers[arm.index()];

            // Clear leftovers before this controller's new wait begins
            self.stats.stale_acks += ctrl.link.drain();

            if !ctrl.link.is_connected() {
                warn!("[{}] Offline, skipping {}", arm, script.token);
                continue;
            }

            if !ctrl.fsm.is_idle() {
                error!(
                    "[{}] Refusing to write {}: controller is {:?}",
                    arm,
                    script.token,
                    ctrl.fsm.status()
                );
                continue;
            }

            match ctrl.link.write(&encoded).await {
                Ok(()) => {
                    // The ACK deadline runs from the completed write
                    ctrl.fsm.process_event(AckEvent::Sent, now());
                    debug!("[{}] -> {}", arm, script.token);
                    sent[arm.index()] = true;
                }
                Err(e) => {
                    self.stats.write_failures += 1;
                    warn!("[{}] {}", arm, e);
                }
            }
        }

        if !sent.iter().any(|s| *s) {
            self.stats.dropped += 1;
            warn!(
                "[DISPATCH] Dropped {}: no {} controller connected",
                script.token, assignment
            );
            return DispatchOutcome::Dropped;
        }
        self.stats.dispatched += 1;

        // Both waits run together so neither arm blocks the other
        let [left, right] = &mut self.controllers;
        let (left_outcome, right_outcome) = join(
            await_ack(left, &script.token),
            await_ack(right, &script.token),
        )
        .await;

        for outcome in [left_outcome, right_outcome] {
            match outcome {
                AckOutcome::Acked => self.stats.acknowledged += 1,
                AckOutcome::TimedOut => self.stats.timeouts += 1,
                AckOutcome::Lost => self.stats.abandoned += 1,
                AckOutcome::NotSent => {}
            }
        }

        DispatchOutcome::Delivered
    }
}

/// Wait for one controller to finish its outstanding command
async fn await_ack(ctrl: &mut ControllerState, token: &str) -> AckOutcome {
    let Some(deadline) = ctrl.fsm.deadline() else {
        return AckOutcome::NotSent;
    };
    let arm = ctrl.link.arm();

    let mut lost_reason = String::new();
    let result = match timeout_at(Instant::from_std(deadline), ctrl.link.next_signal()).await {
        Ok(LinkSignal::Ack) => ctrl.fsm.process_event(AckEvent::AckReceived, now()),
        Ok(LinkSignal::Lost(reason)) => {
            lost_reason = reason;
            ctrl.fsm.process_event(AckEvent::ConnectionLost, now())
        }
        Err(_) => ctrl.fsm.process_event(AckEvent::Timeout, now()),
    };

    match result {
        TransitionResult::Completed { elapsed } => {
            debug!("[{}] {} acknowledged in {:?}", arm, token, elapsed);
            AckOutcome::Acked
        }
        TransitionResult::TimedOut { elapsed } => {
            warn!(
                "[{}] No ACK for {} after {:?}, treating as complete",
                arm, token, elapsed
            );
            AckOutcome::TimedOut
        }
        TransitionResult::Abandoned => {
            warn!("[{}] Link lost while {} was running: {}", arm, token, lost_reason);
            AckOutcome::Lost
        }
        TransitionResult::Sent | TransitionResult::Invalid { .. } => AckOutcome::NotSent,
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            // Sender gone without asking for shutdown
            std::future::pending::<()>().await;
        }
    }
}

/// Current time on the runtime clock
fn now() -> std::time::Instant {
    Instant::now().into_std()
}
