use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marauder_bridge::serial::{self, LinkOptions, SerialLink};
use marauder_bridge::{AppState, build_router, poller};

/// Web control bridge for a serial-attached Marauder/BTC-clock device.
#[derive(Parser)]
#[command(name = "marauder-bridge", version, about)]
struct Cli {
    /// Serial device path
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial baud rate
    #[arg(long, default_value_t = 115200)]
    baud: u32,

    /// Host to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port for the web interface
    #[arg(long, default_value_t = 8080)]
    port_web: u16,

    /// Seconds between device status polls
    #[arg(long, default_value_t = 5)]
    poll_interval: u64,

    /// List detected serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if cli.list_ports {
        return print_ports();
    }

    let link = SerialLink::connect(&LinkOptions {
        path: cli.port.clone(),
        baud_rate: cli.baud,
    })
    .await
    .with_context(|| format!("failed to connect to the device on {}", cli.port))?;

    let state = Arc::new(AppState::new(link));
    let poll_handle = poller::spawn(Arc::clone(&state), Duration::from_secs(cli.poll_interval));

    let app = build_router(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port_web)
        .parse()
        .context("invalid host/port for the web interface")?;
    tracing::info!("marauder-bridge listening on http://{addr}");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poll_handle.abort();
    tracing::info!("marauder-bridge shutdown complete");
    Ok(())
}

fn print_ports() -> Result<()> {
    let ports = serial::list_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(info) => println!(
                "{}  usb {:04x}:{:04x}  {}",
                port.port_name,
                info.vid,
                info.pid,
                info.product.as_deref().unwrap_or("-"),
            ),
            other => println!("{}  {:?}", port.port_name, other),
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt()).expect("listen SIGINT");
    let mut sigterm = signal(SignalKind::terminate()).expect("listen SIGTERM");
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
