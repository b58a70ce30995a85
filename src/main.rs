mod connection;
mod dispatch;
mod feeder;
mod transport;

use anyhow::Result;
use clap::Parser;
use connection::{ControllerLink, LinkConfig};
use dispatch::{motion_queue, DispatchConfig, DispatchEngine};
use signarm_shared::{timing, Arm};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use transport::{ControllerTransport, SerialConnector, TcpConnector};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Drive the two signing arm controllers from a stream of motion scripts
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial port of the left arm controller
    #[arg(long, default_value = "/dev/ttyUSB0")]
    left_port: String,

    /// Serial port of the right arm controller
    #[arg(long, default_value = "/dev/ttyUSB1")]
    right_port: String,

    #[arg(long, default_value_t = timing::BAUD_RATE)]
    baud: u32,

    /// Reach the left controller over TCP instead of serial
    #[arg(long)]
    left_tcp: Option<String>,

    /// Reach the right controller over TCP instead of serial
    #[arg(long)]
    right_tcp: Option<String>,

    #[arg(long, default_value_t = timing::ACK_TIMEOUT_MS)]
    ack_timeout_ms: u64,

    #[arg(long, default_value_t = timing::FINGERSPELL_POST_DELAY_MS)]
    fingerspell_delay_ms: u64,

    #[arg(long, default_value_t = timing::SIGN_POST_DELAY_MS)]
    sign_delay_ms: u64,

    #[arg(long, default_value_t = timing::RECONNECT_INTERVAL_MS)]
    reconnect_interval_ms: u64,

    /// Wait after opening a serial port while the controller boots
    #[arg(long, default_value_t = timing::BOOT_SETTLE_MS)]
    settle_ms: u64,

    /// JSON-lines file of motion scripts (stdin when omitted)
    #[arg(long)]
    scripts: Option<PathBuf>,

    /// Send both arms to rest before the first script and after the last
    #[arg(long)]
    rest: bool,
}

impl Cli {
    fn transport(&self, arm: Arm) -> ControllerTransport {
        let (tcp, port) = match arm {
            Arm::Left => (&self.left_tcp, &self.left_port),
            Arm::Right => (&self.right_tcp, &self.right_port),
        };
        match tcp {
            Some(address) => ControllerTransport::Tcp {
                address: address.clone(),
            },
            None => ControllerTransport::Serial {
                port: port.clone(),
                baud: self.baud,
            },
        }
    }

    fn link_config(&self) -> LinkConfig {
        LinkConfig {
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            ..Default::default()
        }
    }

    fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            fingerspell_post_delay: Duration::from_millis(self.fingerspell_delay_ms),
            sign_post_delay: Duration::from_millis(self.sign_delay_ms),
            ..Default::default()
        }
    }
}

fn spawn_link(
    arm: Arm,
    transport: &ControllerTransport,
    settle: Duration,
    config: LinkConfig,
) -> ControllerLink {
    info!("  {}: {}", arm, transport);
    match transport {
        ControllerTransport::Serial { port, baud } => {
            let connector = SerialConnector::new(port.clone(), *baud).with_settle(settle);
            ControllerLink::spawn(arm, connector, config)
        }
        ControllerTransport::Tcp { address } => {
            ControllerLink::spawn(arm, TcpConnector::new(address.clone()), config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    info!("Sign dispatch starting");
    let link_config = cli.link_config();
    let settle = Duration::from_millis(cli.settle_ms);
    let left = spawn_link(Arm::Left, &cli.transport(Arm::Left), settle, link_config.clone());
    let right = spawn_link(Arm::Right, &cli.transport(Arm::Right), settle, link_config);

    let (queue, receiver) = motion_queue();
    let feeder = feeder::spawn_feeder(cli.scripts.clone(), queue, cli.rest);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current script");
            let _ = shutdown_tx.send(true);
        }
    });

    let engine = DispatchEngine::new(cli.dispatch_config(), receiver, left, right)
        .with_shutdown(shutdown_rx);
    let stats = engine.run().await;

    info!(
        "Dispatched {} scripts ({} acknowledged, {} timeouts, {} abandoned)",
        stats.dispatched, stats.acknowledged, stats.timeouts, stats.abandoned
    );
    info!(
        "Skipped {} dropped, {} malformed; {} write failures, {} stale ACKs",
        stats.dropped, stats.malformed, stats.write_failures, stats.stale_acks
    );

    // Still blocked on input after a Ctrl-C; exiting takes it down
    if feeder.is_finished() {
        match feeder.join() {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Script feeder failed: {}", e),
            Err(_) => error!("Script feeder panicked"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["signarm-dispatch"]);
        assert_eq!(
            cli.transport(Arm::Left),
            ControllerTransport::serial("/dev/ttyUSB0")
        );
        assert_eq!(
            cli.transport(Arm::Right),
            ControllerTransport::serial("/dev/ttyUSB1")
        );

        let config = cli.dispatch_config();
        assert_eq!(config.ack_timeout, Duration::from_secs(8));
        assert_eq!(config.fingerspell_post_delay, Duration::from_millis(30));
        assert_eq!(config.sign_post_delay, Duration::from_millis(150));
        assert!(!cli.rest);
        assert_eq!(cli.settle_ms, 2000);
    }

    #[test]
    fn test_cli_tcp_override() {
        let cli = Cli::parse_from([
            "signarm-dispatch",
            "--right-tcp",
            "127.0.0.1:7002",
            "--ack-timeout-ms",
            "2000",
            "--rest",
            "--settle-ms",
            "0",
        ]);
        assert!(matches!(cli.transport(Arm::Left), ControllerTransport::Serial { .. }));
        assert_eq!(
            cli.transport(Arm::Right),
            ControllerTransport::Tcp {
                address: "127.0.0.1:7002".into()
            }
        );
        assert_eq!(cli.dispatch_config().ack_timeout, Duration::from_secs(2));
        assert!(cli.rest);
        assert_eq!(cli.settle_ms, 0);
    }
}
