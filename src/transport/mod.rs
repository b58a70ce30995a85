pub mod serial;
pub mod tcp;
pub mod traits;

#[cfg(test)]
pub mod loopback;

pub use serial::SerialConnector;
pub use tcp::TcpConnector;
pub use traits::{TransportConnector, TransportStream};

use signarm_shared::timing;

/// How a controller is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerTransport {
    /// Serial port (e.g., "/dev/ttyUSB0" or "COM3")
    Serial { port: String, baud: u32 },
    /// TCP bridge or firmware simulator (e.g., "127.0.0.1:7001")
    Tcp { address: String },
}

impl ControllerTransport {
    #[cfg(test)]
    pub fn serial(port: impl Into<String>) -> Self {
        Self::Serial {
            port: port.into(),
            baud: timing::BAUD_RATE,
        }
    }
}

impl std::fmt::Display for ControllerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerTransport::Serial { port, baud } => write!(f, "serial:{}@{}", port, baud),
            ControllerTransport::Tcp { address } => write!(f, "tcp:{}", address),
        }
    }
}
