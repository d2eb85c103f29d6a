//! Serial link to the device.
//!
//! Owns the one serial connection. Everything else in the bridge (the HTTP
//! handlers and the status poller) reaches the wire through this module.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tokio::time::sleep;

/// Grace period after opening the port, giving the device time to finish its
/// reset-on-connect before the first command.
pub const CONNECT_GRACE: Duration = Duration::from_secs(2);

/// Wait between writing a command and draining the reply.
pub const RESPONSE_DELAY: Duration = Duration::from_millis(100);

const READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Not connected to device")]
    NotConnected,
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Minimal transport surface the link needs, so the command logic can be
/// exercised against an in-memory double.
pub trait Transport: Send {
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;
    fn flush(&mut self) -> std::io::Result<()>;
    /// Bytes currently buffered and readable without blocking.
    fn bytes_to_read(&mut self) -> std::io::Result<usize>;
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

struct PortTransport {
    port: Box<dyn SerialPort>,
}

impl Transport for PortTransport {
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.port.write_all(data)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush()
    }

    fn bytes_to_read(&mut self) -> std::io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(std::io::Error::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub path: String,
    pub baud_rate: u32,
}

/// The single exclusively-owned handle to the device's serial port.
///
/// A link is never reopened: it is connected once at startup or not at all,
/// and a failed transport stays failed until the process restarts.
pub struct SerialLink {
    transport: Option<Box<dyn Transport>>,
    response_delay: Duration,
}

impl SerialLink {
    /// Open the port (8N1, no flow control) and wait out the device's reset
    /// grace period. Returns the error as-is on any transport failure; there
    /// is no retry.
    pub async fn connect(opts: &LinkOptions) -> Result<Self, LinkError> {
        let port = serialport::new(&opts.path, opts.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;
        sleep(CONNECT_GRACE).await;
        tracing::info!(port = %opts.path, baud = opts.baud_rate, "serial link connected");
        Ok(Self::with_transport(Box::new(PortTransport { port })))
    }

    /// Link over a transport already in hand (tests, alternate backends).
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Some(transport),
            response_delay: RESPONSE_DELAY,
        }
    }

    /// Link with no transport; every send fails with [`LinkError::NotConnected`].
    pub fn disconnected() -> Self {
        Self {
            transport: None,
            response_delay: RESPONSE_DELAY,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Write `command` plus a newline, wait the fixed response delay, then
    /// drain whatever the device has buffered and return it as text.
    ///
    /// Known limitation: the delay is the only synchronization with the
    /// device. There is no framing or acknowledgment, so a reply that
    /// arrives late comes back truncated and back-to-back replies can merge.
    /// Callers treat the result as an opaque best-effort snapshot.
    pub async fn send_command(&mut self, command: &str) -> Result<String, LinkError> {
        let transport = self.transport.as_mut().ok_or(LinkError::NotConnected)?;
        transport.write_all(format!("{command}\n").as_bytes())?;
        transport.flush()?;

        sleep(self.response_delay).await;

        let pending = transport.bytes_to_read()?;
        let mut buf = vec![0u8; pending];
        let mut filled = 0;
        while filled < pending {
            match transport.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Enumerate serial ports visible on the host.
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, LinkError> {
    Ok(serialport::available_ports()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct ScriptedTransport {
        written: Arc<Mutex<Vec<u8>>>,
        pending: Arc<Mutex<Vec<u8>>>,
    }

    impl Transport for ScriptedTransport {
        fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        fn bytes_to_read(&mut self) -> std::io::Result<usize> {
            Ok(self.pending.lock().unwrap().len())
        }

        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let mut pending = self.pending.lock().unwrap();
            let n = buf.len().min(pending.len());
            buf[..n].copy_from_slice(&pending[..n]);
            pending.drain(..n);
            Ok(n)
        }
    }

    #[tokio::test]
    async fn send_fails_when_disconnected() {
        let mut link = SerialLink::disconnected();
        assert!(!link.is_connected());
        let err = link.send_command("status").await.unwrap_err();
        assert!(matches!(err, LinkError::NotConnected));
        assert_eq!(err.to_string(), "Not connected to device");
    }

    #[tokio::test]
    async fn send_appends_newline_and_drains_reply() {
        let transport = ScriptedTransport::default();
        transport
            .pending
            .lock()
            .unwrap()
            .extend_from_slice(b"{\"mode\":\"btc\"}");

        let mut link = SerialLink::with_transport(Box::new(transport.clone()));
        let reply = link.send_command("status").await.unwrap();

        assert_eq!(&*transport.written.lock().unwrap(), b"status\n");
        assert_eq!(reply, "{\"mode\":\"btc\"}");
    }

    #[tokio::test]
    async fn send_with_empty_reply_returns_empty_string() {
        let transport = ScriptedTransport::default();
        let mut link = SerialLink::with_transport(Box::new(transport));
        let reply = link.send_command("restart").await.unwrap();
        assert_eq!(reply, "");
    }
}
