//! Minimal MQTT 3.1.1 client over any [`Transport`].
//!
//! Implements [`BrokerConnector`] / [`BrokerConnection`] for the session
//! state machine.  Each [`MqttConnection`] owns its transport plus one send
//! and one receive buffer of [`packet::BUFFER_SIZE`] bytes; they live and die
//! with the connection and are never shared.
//!
//! ## Keep-alive
//!
//! While servicing, a PINGREQ is sent once nothing has been written for a
//! full keep-alive period.  If the PINGRESP has not arrived one keep-alive
//! period after that, the connection is declared dead.

pub mod packet;

use core::time::Duration;
use std::time::Instant;

use log::{debug, trace};

use crate::app::ports::{BrokerConnection, BrokerConnector, ConnectOptions, Transport, TransportConnector};
use crate::error::{ProtocolError, TransportError};
use packet::{Packet, PacketBuf, BUFFER_SIZE, SUBACK_FAILURE};

// ───────────────────────────────────────────────────────────────
// Connector
// ───────────────────────────────────────────────────────────────

/// Opens MQTT connections on top of a transport connector.
pub struct MqttConnector<C> {
    transport: C,
}

impl<C: TransportConnector> MqttConnector<C> {
    pub fn new(transport: C) -> Self {
        Self { transport }
    }
}

impl<C: TransportConnector> BrokerConnector for MqttConnector<C> {
    type Connection = MqttConnection<C::Connection>;

    fn open(&mut self, host: &str, port: u16) -> Result<Self::Connection, TransportError> {
        let transport = self.transport.connect(host, port)?;
        Ok(MqttConnection::new(transport))
    }
}

// ───────────────────────────────────────────────────────────────
// Connection
// ───────────────────────────────────────────────────────────────

pub struct MqttConnection<T> {
    transport: T,
    tx: PacketBuf,
    rx: PacketBuf,
    next_packet_id: u16,
    keep_alive: Duration,
    last_sent: Instant,
    ping_sent_at: Option<Instant>,
}

impl<T: Transport> MqttConnection<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            tx: PacketBuf::new(),
            rx: PacketBuf::new(),
            next_packet_id: 1,
            keep_alive: Duration::ZERO,
            last_sent: Instant::now(),
            ping_sent_at: None,
        }
    }

    /// Packet identifiers are non-zero and wrap.
    fn next_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }

    fn flush_tx(&mut self) -> Result<(), ProtocolError> {
        let result = self.transport.send(&self.tx);
        self.tx.clear();
        result?;
        self.last_sent = Instant::now();
        Ok(())
    }

    /// Length of the complete frame at the front of `rx`, if there is one.
    fn buffered_frame(&self) -> Result<Option<usize>, ProtocolError> {
        match packet::frame_len(&self.rx)? {
            Some(len) if len > BUFFER_SIZE => Err(ProtocolError::Overflow),
            Some(len) if self.rx.len() >= len => Ok(Some(len)),
            _ => Ok(None),
        }
    }

    /// Append one read from the transport to `rx`.  False on timeout.
    fn read_chunk(&mut self, timeout: Duration) -> Result<bool, ProtocolError> {
        let mut chunk = [0u8; 128];
        let want = (BUFFER_SIZE - self.rx.len()).min(chunk.len());
        match self.transport.receive(&mut chunk[..want], timeout) {
            Ok(n) => {
                // `want` never exceeds the free space in `rx`.
                let _ = self.rx.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Err(TransportError::Timeout) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait until a complete frame sits at the front of `rx`, or `deadline`
    /// passes.  Returns the frame length.
    fn next_frame(&mut self, deadline: Instant) -> Result<Option<usize>, ProtocolError> {
        loop {
            if let Some(len) = self.buffered_frame()? {
                return Ok(Some(len));
            }
            let now = Instant::now();
            if now >= deadline || !self.read_chunk(deadline - now)? {
                return Ok(None);
            }
        }
    }

    /// Handle every frame that arrived while nobody was reading, without
    /// waiting for more.
    fn drain_pending(&mut self, on_message: &mut dyn FnMut(&str, &[u8])) -> Result<(), ProtocolError> {
        loop {
            if let Some(len) = self.buffered_frame()? {
                self.dispatch(len, on_message)?;
            } else if !self.read_chunk(Duration::ZERO)? {
                return Ok(());
            }
        }
    }

    /// Drop the first `len` bytes of `rx`, keeping any bytes of the next frame.
    fn consume(&mut self, len: usize) {
        let rest = self.rx.len() - len;
        self.rx.copy_within(len.., 0);
        self.rx.truncate(rest);
    }

    /// When the next keep-alive action (ping or expiry check) is due.
    fn keep_alive_due(&self) -> Option<Instant> {
        if self.keep_alive.is_zero() {
            return None;
        }
        Some(self.ping_sent_at.unwrap_or(self.last_sent) + self.keep_alive)
    }

    fn keep_alive_tick(&mut self) -> Result<(), ProtocolError> {
        let Some(due) = self.keep_alive_due() else {
            return Ok(());
        };
        let now = Instant::now();
        if now < due {
            return Ok(());
        }
        if self.ping_sent_at.is_some() {
            return Err(ProtocolError::KeepAliveExpired);
        }
        trace!("MQTT: PINGREQ");
        packet::encode_pingreq(&mut self.tx)?;
        self.flush_tx()?;
        self.ping_sent_at = Some(now);
        Ok(())
    }

    /// Handle one inbound frame while servicing.
    fn dispatch(&mut self, len: usize, on_message: &mut dyn FnMut(&str, &[u8])) -> Result<(), ProtocolError> {
        let mut ack = None;
        match packet::decode_frame(&self.rx[..len])? {
            Packet::Publish { topic, payload, qos, packet_id } => {
                debug!("MQTT: PUBLISH '{}' ({} bytes, QoS {})", topic, payload.len(), qos);
                on_message(topic, payload);
                if qos == 1 {
                    ack = packet_id;
                }
            }
            Packet::PingResp => {
                trace!("MQTT: PINGRESP");
                self.ping_sent_at = None;
            }
            other => debug!("MQTT: ignoring {:?}", other),
        }
        self.consume(len);
        if let Some(id) = ack {
            packet::encode_puback(&mut self.tx, id)?;
            self.flush_tx()?;
        }
        Ok(())
    }
}

impl<T: Transport> BrokerConnection for MqttConnection<T> {
    fn handshake(&mut self, options: &ConnectOptions<'_>, timeout_ms: u32) -> Result<(), ProtocolError> {
        packet::encode_connect(&mut self.tx, options)?;
        self.flush_tx()?;
        self.keep_alive = Duration::from_secs(u64::from(options.keep_alive_secs));

        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        let len = self.next_frame(deadline)?.ok_or(ProtocolError::Timeout)?;
        let header = self.rx[0];
        let outcome = match packet::decode_frame(&self.rx[..len])? {
            Packet::ConnAck { return_code: 0, .. } => Ok(()),
            Packet::ConnAck { return_code, .. } => Err(ProtocolError::Refused(return_code)),
            _ => Err(ProtocolError::Unexpected(header & 0xF0)),
        };
        self.consume(len);
        outcome
    }

    fn subscribe(&mut self, filter: &str, timeout_ms: u32) -> Result<(), ProtocolError> {
        let id = self.next_id();
        packet::encode_subscribe(&mut self.tx, id, filter)?;
        self.flush_tx()?;

        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        loop {
            let len = self.next_frame(deadline)?.ok_or(ProtocolError::Timeout)?;
            let outcome = match packet::decode_frame(&self.rx[..len])? {
                Packet::SubAck { packet_id, return_code } if packet_id == id => {
                    if return_code == SUBACK_FAILURE {
                        Some(Err(ProtocolError::SubscribeRejected))
                    } else {
                        Some(Ok(()))
                    }
                }
                other => {
                    debug!("MQTT: ignoring {:?} while waiting for SUBACK", other);
                    None
                }
            };
            self.consume(len);
            if let Some(result) = outcome {
                return result;
            }
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ProtocolError> {
        packet::encode_publish(&mut self.tx, topic, payload)?;
        self.flush_tx()
    }

    fn service(&mut self, wait_ms: u32, on_message: &mut dyn FnMut(&str, &[u8])) -> Result<(), ProtocolError> {
        let deadline = Instant::now() + Duration::from_millis(u64::from(wait_ms));
        // A PINGRESP may have landed during the caller's sleep.
        self.drain_pending(on_message)?;
        loop {
            self.keep_alive_tick()?;
            if Instant::now() >= deadline {
                return Ok(());
            }
            let until = self.keep_alive_due().map_or(deadline, |due| due.min(deadline));
            if let Some(len) = self.next_frame(until)? {
                self.dispatch(len, on_message)?;
            }
        }
    }

    fn disconnect(&mut self) -> Result<(), ProtocolError> {
        packet::encode_disconnect(&mut self.tx)?;
        self.flush_tx()
    }

    fn close(self) {
        self.transport.close();
    }
}
