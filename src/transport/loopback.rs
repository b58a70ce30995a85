//! In-memory controllers for tests
//!
//! A `LoopbackConnector` hands out duplex streams plugged in by the test, and a
//! `FakeController` plays the firmware side: it records every command line and
//! answers with `ACK` according to a per-command plan.

use crate::transport::traits::{TransportConnector, TransportStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const DUPLEX_CAPACITY: usize = 64 * 1024;

impl TransportStream for DuplexStream {
    fn describe(&self) -> String {
        "loopback".into()
    }
}

/// Connector that yields whatever streams have been plugged in
pub struct LoopbackConnector {
    streams: Mutex<mpsc::UnboundedReceiver<DuplexStream>>,
    label: String,
}

/// Test-side handle for plugging devices into a `LoopbackConnector`
#[derive(Clone)]
pub struct LoopbackPlug {
    tx: mpsc::UnboundedSender<DuplexStream>,
}

impl LoopbackPlug {
    /// Make a new device available; returns the controller end
    pub fn plug(&self) -> DuplexStream {
        self.plug_with_capacity(DUPLEX_CAPACITY)
    }

    /// Like `plug`, with a small buffer so unread commands stall the writer
    pub fn plug_with_capacity(&self, capacity: usize) -> DuplexStream {
        let (engine_end, controller_end) = tokio::io::duplex(capacity);
        let _ = self.tx.send(engine_end);
        controller_end
    }
}

pub fn loopback(label: &str) -> (LoopbackConnector, LoopbackPlug) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        LoopbackConnector {
            streams: Mutex::new(rx),
            label: label.to_string(),
        },
        LoopbackPlug { tx },
    )
}

#[async_trait]
impl TransportConnector for LoopbackConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> Result<Self::Stream> {
        self.streams
            .lock()
            .await
            .try_recv()
            .map_err(|_| anyhow!("no device plugged into {}", self.label))
    }

    fn name(&self) -> &'static str {
        "Loopback"
    }

    fn target(&self) -> &str {
        &self.label
    }
}

/// How the fake firmware answers a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPlan {
    Immediate,
    After(Duration),
    Never,
}

/// One command line as seen by the fake firmware
#[derive(Debug, Clone)]
pub struct Received {
    pub at: Instant,
    pub token: String,
    pub line: String,
}

/// Firmware stand-in on the controller end of a loopback stream
pub struct FakeController {
    received: Arc<StdMutex<Vec<Received>>>,
    overlapped: Arc<AtomicBool>,
    _task: JoinHandle<()>,
}

impl FakeController {
    /// Answer every command the same way
    pub fn spawn(stream: DuplexStream, plan: AckPlan) -> Self {
        Self::spawn_with_plans(stream, Vec::new(), plan)
    }

    /// Answer the n-th command with `plans[n]`, falling back to `default`
    pub fn spawn_with_plans(stream: DuplexStream, plans: Vec<AckPlan>, default: AckPlan) -> Self {
        let received = Arc::new(StdMutex::new(Vec::new()));
        let overlapped = Arc::new(AtomicBool::new(false));
        let outstanding = Arc::new(AtomicUsize::new(0));

        let (reader, writer) = tokio::io::split(stream);
        let writer = Arc::new(Mutex::new(writer));

        let received_clone = received.clone();
        let overlapped_clone = overlapped.clone();
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut index = 0;

            while let Ok(Some(line)) = lines.next_line().await {
                let token = serde_json::from_str::<serde_json::Value>(&line)
                    .ok()
                    .and_then(|v| v["token"].as_str().map(str::to_string))
                    .unwrap_or_default();

                received_clone.lock().unwrap().push(Received {
                    at: Instant::now(),
                    token,
                    line,
                });

                if outstanding.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlapped_clone.store(true, Ordering::SeqCst);
                }

                let plan = plans.get(index).copied().unwrap_or(default);
                index += 1;

                let writer = writer.clone();
                let outstanding = outstanding.clone();
                match plan {
                    AckPlan::Immediate => {
                        send_ack(&writer, &outstanding).await;
                    }
                    AckPlan::After(delay) => {
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            send_ack(&writer, &outstanding).await;
                        });
                    }
                    AckPlan::Never => {
                        let mut w = writer.lock().await;
                        let _ = w.write_all(b"[FAKE] busy, ignoring command\r\n").await;
                    }
                }
            }
        });

        Self {
            received,
            overlapped,
            _task: task,
        }
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.received().into_iter().map(|r| r.token).collect()
    }

    /// Whether a command ever arrived while an earlier one was still unacknowledged
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

async fn send_ack(writer: &Arc<Mutex<WriteHalf<DuplexStream>>>, outstanding: &AtomicUsize) {
    let mut w = writer.lock().await;
    let _ = w.write_all(b"[FAKE] Command queued\r\n").await;
    // Decrement before the ACK leaves so the next command is not counted as overlap
    outstanding.fetch_sub(1, Ordering::SeqCst);
    let _ = w.write_all(b"ACK\r\n").await;
}
