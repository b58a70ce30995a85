//! Serial transport for the arm controllers

use crate::transport::traits::{TransportConnector, TransportStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use signarm_shared::timing;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Serial stream wrapper implementing TransportStream
pub struct SerialTransportStream {
    inner: SerialStream,
    port: String,
}

impl SerialTransportStream {
    pub fn new(stream: SerialStream, port: String) -> Self {
        Self { inner: stream, port }
    }
}

impl AsyncRead for SerialTransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for SerialTransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl TransportStream for SerialTransportStream {
    fn describe(&self) -> String {
        format!("serial:{}", self.port)
    }
}

/// Serial connector for one controller port
pub struct SerialConnector {
    port: String,
    baud: u32,
    /// Wait after opening; ESP32 boards reboot when the port opens
    settle: Duration,
}

impl SerialConnector {
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            settle: Duration::from_millis(timing::BOOT_SETTLE_MS),
        }
    }

    /// Override the post-open settle delay
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

#[async_trait]
impl TransportConnector for SerialConnector {
    type Stream = SerialTransportStream;

    async fn connect(&self) -> Result<Self::Stream> {
        let stream = tokio_serial::new(&self.port, self.baud)
            .open_native_async()
            .map_err(|e| anyhow!("failed to open {}: {}", self.port, e))?;

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        Ok(SerialTransportStream::new(stream, self.port.clone()))
    }

    fn name(&self) -> &'static str {
        "Serial"
    }

    fn target(&self) -> &str {
        &self.port
    }
}
