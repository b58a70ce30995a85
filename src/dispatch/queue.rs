//! Motion queue between the sign lookup stage and the dispatch engine
//!
//! Producers may live on plain threads: `enqueue` never blocks and needs no runtime.

use anyhow::{anyhow, Result};
use signarm_shared::MotionScript;
use tokio::sync::mpsc;

/// Producer handle; clone freely
#[derive(Debug, Clone)]
pub struct MotionQueue {
    tx: mpsc::UnboundedSender<MotionScript>,
}

/// Consumer end, owned by the dispatch engine
#[derive(Debug)]
pub struct MotionReceiver {
    rx: mpsc::UnboundedReceiver<MotionScript>,
}

/// Create a new unbounded FIFO
pub fn motion_queue() -> (MotionQueue, MotionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MotionQueue { tx }, MotionReceiver { rx })
}

impl MotionQueue {
    /// Append a script; fails only once the engine has gone away
    pub fn enqueue(&self, script: MotionScript) -> Result<()> {
        self.tx
            .send(script)
            .map_err(|e| anyhow!("Motion queue closed, dropped {}", e.0.token))
    }
}

impl MotionReceiver {
    /// Wait for the next script
    ///
    /// Returns `None` once every producer handle is dropped and the queue is empty.
    pub async fn dequeue(&mut self) -> Option<MotionScript> {
        self.rx.recv().await
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rx.len()
    }
}
