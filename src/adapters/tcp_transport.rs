//! Plain TCP transport to the broker.
//!
//! Implements [`TransportConnector`] and [`Transport`] on `std::net`.  The
//! same code runs on ESP-IDF (lwIP sockets behind the std shim) and on the
//! host, so there is no cfg split here.
//!
//! Reads use a per-call socket timeout; an expired timeout is reported as
//! [`TransportError::Timeout`] and is not fatal.  A zero-byte read means the
//! broker closed the connection.

use core::time::Duration;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

use log::{debug, info, warn};

use crate::app::ports::{Transport, TransportConnector};
use crate::error::TransportError;

/// Smallest read timeout handed to the socket; zero would mean "block forever".
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Opens [`TcpTransport`]s with a bounded connect timeout.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl TransportConnector for TcpConnector {
    type Connection = TcpTransport;

    fn connect(&mut self, host: &str, port: u16) -> Result<TcpTransport, TransportError> {
        let mut addrs = (host, port).to_socket_addrs().map_err(|e| {
            warn!("TCP: cannot resolve '{}': {}", host, e);
            TransportError::Resolve
        })?;
        let addr = addrs.next().ok_or(TransportError::Resolve)?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            warn!("TCP: connect to {} failed: {}", addr, e);
            match e.kind() {
                ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::Timeout,
                _ => TransportError::Connect,
            }
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP: TCP_NODELAY not set: {}", e);
        }
        info!("TCP: connected to {}", addr);
        Ok(TcpTransport { stream })
    }
}

/// One open TCP connection.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(data).map_err(|e| {
            warn!("TCP: send failed: {}", e);
            TransportError::Io
        })
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        self.stream
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))
            .map_err(|_| TransportError::Io)?;
        match self.stream.read(buf) {
            Ok(0) if !buf.is_empty() => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut => Err(TransportError::Timeout),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                    Err(TransportError::Closed)
                }
                _ => {
                    warn!("TCP: receive failed: {}", e);
                    Err(TransportError::Io)
                }
            },
        }
    }

    fn close(self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("TCP: shutdown: {}", e);
        }
        info!("TCP: connection closed");
    }
}
