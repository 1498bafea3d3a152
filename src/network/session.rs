//! Session
//!
//! One connection to a server node: handshake, request-id sequence, and the
//! request/response exchange for every operation.
//!
//! ## Lifecycle
//! ```text
//! Unconnected ──connect()──► Handshaking ──success──► Ready ──disconnect()──► Closed
//!                                 │                                              ▲
//!                                 └──────────────rejected / I/O error────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::binary::BinaryType;
use crate::config::{ClientConfig, ProtocolVersion};
use crate::error::{Result, ThinError};
use crate::protocol::codec::error_message;
use crate::protocol::packet::HANDSHAKE;
use crate::protocol::{
    build_request, decode_fields, packet_spec, parse_response, Command, Mode, PacketSpec, Reply,
    RequestFields, ResponseFields,
};

use super::transport::{TcpTransport, Transport};

/// Process-wide session ordinal; seeds each session's request ids
static NEXT_SESSION: AtomicU64 = AtomicU64::new(0);

const REQUEST_ID_BASE: u64 = 1 << 32;

/// First request id for the session with the given ordinal
///
/// Ids start in `2^32..2^33` so sessions of one process don't collide for
/// their first 2^32 requests.
fn initial_request_id(ordinal: u64) -> u64 {
    (ordinal % REQUEST_ID_BASE) + REQUEST_ID_BASE
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Handshaking,
    Ready,
    Closed,
}

/// A connection to one server node
pub struct Session<T: Transport = TcpTransport> {
    config: ClientConfig,
    transport: Option<T>,
    state: SessionState,
    next_request_id: AtomicU64,
    authenticated: bool,
}

impl<T: Transport> Session<T> {
    /// Create an unconnected session
    pub fn new(config: ClientConfig) -> Self {
        let ordinal = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        Self {
            config,
            transport: None,
            state: SessionState::Unconnected,
            next_request_id: AtomicU64::new(initial_request_id(ordinal)),
            authenticated: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Whether the handshake carried credentials and succeeded
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.config.version
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Request id the next call will use
    pub fn peek_request_id(&self) -> u64 {
        self.next_request_id.load(Ordering::Relaxed)
    }

    /// Handshake over an already-open transport
    ///
    /// Any failure leaves the session Closed.
    pub fn connect_with(&mut self, mut transport: T) -> Result<()> {
        if self.state != SessionState::Unconnected {
            return Err(ThinError::Protocol(format!(
                "cannot connect a session in state {:?}",
                self.state
            )));
        }

        self.state = SessionState::Handshaking;
        match self.handshake(&mut transport) {
            Ok(()) => {
                self.transport = Some(transport);
                self.state = SessionState::Ready;
                tracing::debug!(
                    version = %self.config.version,
                    authenticated = self.authenticated,
                    "Handshake accepted"
                );
                Ok(())
            }
            Err(e) => {
                transport.close();
                self.state = SessionState::Closed;
                tracing::warn!("Handshake failed: {}", e);
                Err(e)
            }
        }
    }

    fn handshake(&mut self, transport: &mut T) -> Result<()> {
        let version = self.config.version;
        let mut fields = RequestFields::new()
            .with("version_number_1", version.major as i32)
            .with("version_number_2", version.minor as i32)
            .with("version_number_3", version.patch as i32);

        let mode = match self.config.credentials() {
            Some((username, password)) => {
                fields = fields
                    .with_type("binary_object_username", username, BinaryType::String)
                    .with_type("binary_object_password", password, BinaryType::String);
                Mode::Auth
            }
            None => Mode::Plain,
        };

        let frame = build_request(&HANDSHAKE, mode, 0, &fields)?;
        tracing::trace!(request = ?frame, "Sending handshake");
        transport.send_frame(&frame)?;
        let raw = transport.receive_frame(self.config.receive_chunk_size, self.config.max_response_size)?;
        tracing::trace!(response = ?&raw[..], "Received handshake response");

        let response = decode_fields(&HANDSHAKE, mode, &raw)?;
        match response.success() {
            Some(true) => {
                self.authenticated = mode == Mode::Auth;
                Ok(())
            }
            Some(false) => Err(rejection(mode, version, &response)),
            None => Err(ThinError::Protocol("handshake response has no success flag".to_string())),
        }
    }

    /// Issue one operation and return its decoded response fields
    ///
    /// A nonzero status comes back as `RemoteOperation`. Any failure while
    /// sending the request or reading the response frame (I/O, a negative or
    /// oversized length prefix) closes the session, since the stream position
    /// is no longer known.
    pub fn call(&mut self, spec: &'static PacketSpec, fields: &RequestFields) -> Result<ResponseFields> {
        if self.state != SessionState::Ready {
            return Err(ThinError::Protocol(format!(
                "cannot issue {} in state {:?}",
                spec.name, self.state
            )));
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let frame = build_request(spec, Mode::Plain, request_id, fields)?;

        let raw = match self.exchange(&frame) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(operation = spec.name, request_id, error = %e, "Exchange failed");
                self.disconnect();
                return Err(e);
            }
        };
        tracing::trace!(operation = spec.name, request_id, response = ?&raw[..], "Received response");

        let response = parse_response(spec, Mode::Plain, &raw)?;
        match response.request_id() {
            Some(id) if id != request_id => Err(ThinError::Protocol(format!(
                "{}: response for request {} while waiting for {}",
                spec.name, id, request_id
            ))),
            _ => Ok(response),
        }
    }

    /// Issue an operation by packet name
    pub fn call_named(&mut self, name: &str, fields: &RequestFields) -> Result<ResponseFields> {
        let spec = packet_spec(name)?;
        self.call(spec, fields)
    }

    /// Run a typed command
    pub fn execute(&mut self, command: &Command) -> Result<Reply> {
        let response = self.call(command.operation(), &command.to_fields())?;
        command.reply(&response)
    }

    fn exchange(&mut self, frame: &[u8]) -> Result<Bytes> {
        let chunk_size = self.config.receive_chunk_size;
        let max_size = self.config.max_response_size;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| ThinError::Protocol("session has no transport".to_string()))?;

        tracing::trace!(request = ?frame, "Sending request");
        transport.send_frame(frame)?;
        transport.receive_frame(chunk_size, max_size)
    }

    /// Close the connection; further calls fail
    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        if self.state != SessionState::Closed {
            tracing::debug!("Session closed");
            self.state = SessionState::Closed;
        }
    }
}

impl Session<TcpTransport> {
    /// Open a TCP connection to the configured endpoint and handshake
    pub fn connect(&mut self) -> Result<()> {
        let transport = match TcpTransport::connect(&self.config) {
            Ok(transport) => transport,
            Err(e) => {
                self.state = SessionState::Closed;
                tracing::warn!("Failed to connect to {}: {}", self.config.addr(), e);
                return Err(e);
            }
        };
        self.connect_with(transport)
    }

    /// Create and connect in one step
    pub fn open(config: ClientConfig) -> Result<Self> {
        let mut session = Self::new(config);
        session.connect()?;
        Ok(session)
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.state != SessionState::Unconnected {
            self.disconnect();
        }
    }
}

/// Error for a handshake the server refused
fn rejection(mode: Mode, ours: ProtocolVersion, response: &ResponseFields) -> ThinError {
    let component = |n: u8| {
        response
            .int(&format!("version_number_{}", n))
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(0)
    };
    let server = ProtocolVersion::new(component(1), component(2), component(3));
    let message = error_message(response).unwrap_or_else(|| "handshake rejected".to_string());

    if mode == Mode::Auth && server == ours {
        ThinError::Authentication(message)
    } else {
        ThinError::Protocol(format!(
            "Handshake rejected (server speaks {}, client {}): {}",
            server, ours, message
        ))
    }
}
