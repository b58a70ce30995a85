//! Controller links with background reconnection
//!
//! Each arm gets a supervisor task that owns the connector. It connects, hands the
//! write half of the stream to the dispatch engine, and keeps the read half for
//! itself: lines are decoded there, `ACK`s are forwarded, diagnostics are logged.
//! When the link drops the supervisor reports it and retries on a fixed interval.

use crate::transport::{TransportConnector, TransportStream};
use anyhow::{anyhow, Result};
use signarm_shared::{
    codec::{ControllerLine, LineDecoder},
    timing, Arm,
};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Write half of a controller connection, owned by the dispatch engine
pub type LinkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Events emitted by a link supervisor
///
/// Every event carries the generation of the connection it belongs to, so events
/// from a connection that has since been replaced can be told apart.
pub enum LinkEvent {
    /// A new connection is up; the engine takes the writer
    Connected { generation: u64, writer: LinkWriter },
    /// The controller printed `ACK`
    Ack { generation: u64 },
    /// The connection dropped
    Disconnected { generation: u64, reason: String },
}

/// What a waiting engine learns from the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSignal {
    Ack,
    Lost(String),
}

/// Configuration for a controller link
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Bound on one connection attempt
    pub connect_timeout: Duration,
    /// Fixed delay between reconnection attempts
    pub reconnect_interval: Duration,
    /// Bound on writing one command
    pub write_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(timing::CONNECT_TIMEOUT_MS),
            reconnect_interval: Duration::from_millis(timing::RECONNECT_INTERVAL_MS),
            write_timeout: Duration::from_millis(timing::WRITE_TIMEOUT_MS),
        }
    }
}

/// Engine-side handle to one controller
pub struct ControllerLink {
    arm: Arm,
    config: LinkConfig,
    /// Current writer, absent while disconnected
    writer: Option<LinkWriter>,
    generation: u64,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    /// Tells the supervisor that a write failed on a generation
    lost_tx: mpsc::UnboundedSender<(u64, String)>,
    task: JoinHandle<()>,
}

impl ControllerLink {
    /// Create a link and start its supervisor
    pub fn spawn<C: TransportConnector>(arm: Arm, connector: C, config: LinkConfig) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();

        let config_clone = config.clone();
        let task = tokio::spawn(async move {
            link_loop(arm, connector, config_clone, event_tx, lost_rx).await;
        });

        Self {
            arm,
            config,
            writer: None,
            generation: 0,
            events,
            lost_tx,
            task,
        }
    }

    pub fn arm(&self) -> Arm {
        self.arm
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    /// Wait up to `grace` for the first connection
    pub async fn wait_connected(&mut self, grace: Duration) -> bool {
        self.drain();
        let deadline = Instant::now() + grace;

        while !self.is_connected() {
            match timeout_at(deadline, self.events.recv()).await {
                Ok(Some(event)) => {
                    self.apply(event);
                }
                Ok(None) | Err(_) => break,
            }
        }
        self.is_connected()
    }

    /// Apply every queued event without waiting
    ///
    /// Reconnects and disconnects take effect; ACKs found here belong to no
    /// outstanding command and are discarded. Returns how many were discarded.
    pub fn drain(&mut self) -> u64 {
        let mut stale = 0;
        while let Ok(event) = self.events.try_recv() {
            if let Some(LinkSignal::Ack) = self.apply(event) {
                stale += 1;
            }
        }
        if stale > 0 {
            debug!("[{}] Discarded {} stale ACK(s)", self.arm, stale);
        }
        stale
    }

    /// Wait for the next ACK or loss of the current connection
    pub async fn next_signal(&mut self) -> LinkSignal {
        loop {
            match self.events.recv().await {
                Some(event) => {
                    if let Some(signal) = self.apply(event) {
                        return signal;
                    }
                }
                None => return LinkSignal::Lost("link supervisor stopped".into()),
            }
        }
    }

    /// Write one encoded command
    ///
    /// A failed or stalled write marks the connection lost and schedules a reconnect.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let arm = self.arm;
        let Some(writer) = self.writer.as_mut() else {
            return Err(anyhow!("{} controller not connected", arm));
        };

        let result = match timeout(self.config.write_timeout, write_command(writer, bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("write timed out".to_string()),
        };

        result.map_err(|reason| {
            self.mark_lost(reason.clone());
            anyhow!("write to {} failed: {}", arm, reason)
        })
    }

    /// Drop the current connection and ask the supervisor to reconnect
    pub fn mark_lost(&mut self, reason: String) {
        if self.writer.take().is_some() {
            warn!("[{}] Connection lost: {}", self.arm, reason);
            let _ = self.lost_tx.send((self.generation, reason));
        }
    }

    fn apply(&mut self, event: LinkEvent) -> Option<LinkSignal> {
        match event {
            LinkEvent::Connected { generation, writer } => {
                info!("[{}] Controller link up (generation {})", self.arm, generation);
                self.generation = generation;
                self.writer = Some(writer);
                None
            }
            LinkEvent::Ack { generation } if generation == self.generation => {
                Some(LinkSignal::Ack)
            }
            LinkEvent::Disconnected { generation, reason } if generation == self.generation => {
                self.writer = None;
                Some(LinkSignal::Lost(reason))
            }
            // Leftovers from a replaced connection
            LinkEvent::Ack { .. } | LinkEvent::Disconnected { .. } => None,
        }
    }
}

impl Drop for ControllerLink {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn write_command(writer: &mut LinkWriter, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Supervisor loop with reconnection logic
async fn link_loop<C: TransportConnector>(
    arm: Arm,
    connector: C,
    config: LinkConfig,
    event_tx: mpsc::UnboundedSender<LinkEvent>,
    mut lost_rx: mpsc::UnboundedReceiver<(u64, String)>,
) {
    let mut generation = 0u64;

    loop {
        match timeout(config.connect_timeout, connector.connect()).await {
            Ok(Ok(stream)) => {
                generation += 1;
                info!(
                    "[{}] Connected via {} ({})",
                    arm,
                    connector.name(),
                    stream.describe()
                );

                let (reader, writer) = tokio::io::split(stream);
                let connected = LinkEvent::Connected {
                    generation,
                    writer: Box::new(writer),
                };
                if event_tx.send(connected).is_err() {
                    return;
                }

                let reason =
                    handle_connection(arm, generation, reader, &event_tx, &mut lost_rx).await;
                warn!("[{}] Disconnected: {}", arm, reason);

                if event_tx
                    .send(LinkEvent::Disconnected { generation, reason })
                    .is_err()
                {
                    return;
                }
            }
            Ok(Err(e)) => {
                warn!("[{}] Reconnect to {} failed: {}", arm, connector.target(), e);
            }
            Err(_) => {
                warn!(
                    "[{}] Reconnect to {} timed out after {:?}",
                    arm,
                    connector.target(),
                    config.connect_timeout
                );
            }
        }

        if event_tx.is_closed() {
            return;
        }

        // Fixed interval, no backoff: an unplugged arm should come back quickly
        tokio::time::sleep(config.reconnect_interval).await;
    }
}

/// Read controller output until the connection ends; returns why it ended
async fn handle_connection<R: AsyncRead + Unpin>(
    arm: Arm,
    generation: u64,
    mut reader: R,
    event_tx: &mpsc::UnboundedSender<LinkEvent>,
    lost_rx: &mut mpsc::UnboundedReceiver<(u64, String)>,
) -> String {
    let mut decoder = LineDecoder::new();
    let mut read_buf = vec![0u8; 1024];

    loop {
        tokio::select! {
            // Engine saw a write failure
            lost = lost_rx.recv() => {
                match lost {
                    Some((lost_generation, reason)) if lost_generation == generation => {
                        return reason;
                    }
                    Some(_) => {}
                    None => return "link handle dropped".into(),
                }
            }

            // Controller output
            result = reader.read(&mut read_buf) => {
                match result {
                    Ok(0) => return "controller closed the connection".into(),
                    Ok(n) => {
                        decoder.extend(&read_buf[..n]);
                        loop {
                            match decoder.decode_next() {
                                Ok(Some(ControllerLine::Ack)) => {
                                    debug!("[{}] <- ACK", arm);
                                    if event_tx.send(LinkEvent::Ack { generation }).is_err() {
                                        return "link handle dropped".into();
                                    }
                                }
                                Ok(Some(ControllerLine::Diagnostic(line))) => {
                                    debug!("[{}] <- {}", arm, line);
                                }
                                Ok(None) => break,
                                Err(e) => warn!("[{}] {}", arm, e),
                            }
                        }
                    }
                    Err(e) => return format!("read error: {}", e),
                }
            }
        }
    }
}
