//! Session Tests
//!
//! Tests for the handshake, request ids and the session lifecycle, run
//! against the loopback test server.

#[path = "../support/mod.rs"]
mod support;

use std::collections::VecDeque;
use std::io;

use ignite_thin::binary::Value;
use ignite_thin::network::Transport;
use ignite_thin::protocol::RequestFields;
use ignite_thin::{ClientConfig, Command, ProtocolVersion, Reply, Session, SessionState, ThinError, TypedValue};
use support::{ServerOptions, TestServer, AUTH_FAILURE};

fn credentials(config: &mut ClientConfig, username: &str, password: &str) {
    config.username = Some(username.to_string());
    config.password = Some(password.to_string());
}

fn auth_server() -> TestServer {
    TestServer::with_options(ServerOptions {
        credentials: Some(("ignite".to_string(), "ignite".to_string())),
        ..ServerOptions::default()
    })
}

// =============================================================================
// Handshake
// =============================================================================

#[test]
fn test_connect_reaches_ready() {
    let server = TestServer::start();
    let mut session: Session = Session::new(server.config());
    assert_eq!(session.state(), SessionState::Unconnected);

    session.connect().unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert!(!session.is_authenticated());
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn test_connect_twice_is_rejected() {
    let server = TestServer::start();
    let mut session = Session::open(server.config()).unwrap();
    assert!(matches!(session.connect(), Err(ThinError::Protocol(_))));
    assert!(session.is_ready());
}

#[test]
fn test_authenticated_handshake() {
    let server = auth_server();
    let mut config = server.config();
    credentials(&mut config, "ignite", "ignite");

    let session = Session::open(config).unwrap();
    assert!(session.is_ready());
    assert!(session.is_authenticated());
}

#[test]
fn test_wrong_password() {
    let server = auth_server();
    let mut config = server.config();
    credentials(&mut config, "ignite", "wrong");

    let mut session: Session = Session::new(config);
    match session.connect() {
        Err(ThinError::Authentication(message)) => assert_eq!(message, AUTH_FAILURE),
        other => panic!("expected authentication error, got {:?}", other.err()),
    }
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_missing_credentials_is_a_protocol_error() {
    let server = auth_server();
    let mut session: Session = Session::new(server.config());
    assert!(matches!(session.connect(), Err(ThinError::Protocol(_))));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_unsupported_version() {
    let server = TestServer::start();
    let mut config = server.config();
    config.version = ProtocolVersion::new(2, 0, 0);

    let mut session: Session = Session::new(config);
    match session.connect() {
        Err(ThinError::Protocol(message)) => assert!(message.contains("Unsupported version."), "{}", message),
        other => panic!("expected protocol error, got {:?}", other.err()),
    }
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_connection_refused() {
    // Bind then drop to find a port nobody listens on
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let config = ClientConfig::builder().port(port).build();

    let mut session: Session = Session::new(config);
    assert!(matches!(session.connect(), Err(ThinError::Io(_))));
    assert_eq!(session.state(), SessionState::Closed);
}

// =============================================================================
// Request Ids
// =============================================================================

#[test]
fn test_request_ids_increase_from_high_range() {
    let server = TestServer::start();
    let mut session = Session::open(server.config()).unwrap();
    let first = session.peek_request_id();

    for _ in 0..3 {
        session.execute(&Command::Names).unwrap();
    }

    let seen = server.request_ids();
    assert_eq!(seen, vec![first, first + 1, first + 2]);
    assert!(seen.iter().all(|id| *id >= 1 << 32));
    assert_eq!(session.peek_request_id(), first + 3);
}

#[test]
fn test_sessions_start_from_distinct_ids() {
    let server = TestServer::start();
    let a = Session::open(server.config()).unwrap();
    let b = Session::open(server.config()).unwrap();
    assert_ne!(a.peek_request_id(), b.peek_request_id());
}

#[test]
fn test_mismatched_response_id() {
    let server = TestServer::with_options(ServerOptions {
        mismatch_request_ids: true,
        ..ServerOptions::default()
    });
    let mut session = Session::open(server.config()).unwrap();
    let result = session.execute(&Command::Size { cache: "c".into() });
    assert!(matches!(result, Err(ThinError::Protocol(_))));
}

// =============================================================================
// Calls
// =============================================================================

#[test]
fn test_remote_error_keeps_session_ready() {
    let server = TestServer::start();
    let mut session = Session::open(server.config()).unwrap();

    let missing = session.execute(&Command::Get { cache: "c".into(), key: TypedValue::new(404i64) });
    match missing {
        Err(ThinError::RemoteOperation { operation, status, message }) => {
            assert_eq!(operation, "OP_CACHE_GET");
            assert_eq!(status, support::STATUS_FAILED);
            assert!(message.contains("404"), "{}", message);
        }
        other => panic!("expected remote error, got {:?}", other),
    }
    assert!(session.is_ready());
    assert_eq!(session.execute(&Command::Size { cache: "c".into() }).unwrap(), Reply::Size(0));
}

#[test]
fn test_call_named() {
    let server = TestServer::start();
    let mut session = Session::open(server.config()).unwrap();

    let fields = RequestFields::new()
        .cache("c")
        .with("binary_object_key", 1i64)
        .with("binary_object_value", "one");
    session.call_named("OP_CACHE_PUT", &fields).unwrap();

    let size = session.call_named("OP_CACHE_GET_SIZE", &RequestFields::new().cache("c")).unwrap();
    assert_eq!(size.int("long"), Some(1));

    let unknown = session.call_named("OP_CACHE_FROB", &fields);
    assert!(matches!(unknown, Err(ThinError::UnknownOperation(_))));
}

#[test]
fn test_calls_after_disconnect_fail() {
    let server = TestServer::start();
    let mut session = Session::open(server.config()).unwrap();
    session.disconnect();

    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.execute(&Command::Names), Err(ThinError::Protocol(_))));
    // Idempotent
    session.disconnect();
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_scan_pages_through_cache() {
    let server = TestServer::start();
    let mut session = Session::open(server.config()).unwrap();
    for n in 0..5i64 {
        session
            .execute(&Command::Put {
                cache: "scan".into(),
                key: TypedValue::new(n),
                value: TypedValue::new(format!("v{}", n)),
            })
            .unwrap();
    }

    let mut rows = Vec::new();
    let mut pages = 0;
    let mut command = Command::Scan { cache: "scan".into(), page_size: 2 };
    let cursor_id = loop {
        let page = match session.execute(&command).unwrap() {
            Reply::Page(page) => page,
            other => panic!("expected a page, got {:?}", other),
        };
        pages += 1;
        rows.extend(page.rows);
        if !page.has_more {
            break page.cursor_id;
        }
        command = Command::ScanPage { cursor_id: page.cursor_id };
    };

    assert_eq!(pages, 3);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0], (Value::Long(0), Value::from("v0")));
    assert_eq!(rows[4], (Value::Long(4), Value::from("v4")));

    session.execute(&Command::CloseResource { resource_id: cursor_id }).unwrap();
    let closed = session.execute(&Command::ScanPage { cursor_id });
    assert!(matches!(closed, Err(ThinError::RemoteOperation { .. })));
}

// =============================================================================
// Transport Failures
// =============================================================================

/// Plays back canned responses, then reports the peer closed
struct Canned {
    responses: VecDeque<Vec<u8>>,
}

impl Canned {
    fn new(responses: Vec<Vec<u8>>) -> Self {
        Self {
            responses: VecDeque::from(responses),
        }
    }
}

impl Transport for Canned {
    fn send(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn receive(&mut self, _max_bytes: usize) -> io::Result<Vec<u8>> {
        Ok(self.responses.pop_front().unwrap_or_default())
    }
}

#[test]
fn test_io_failure_closes_session() {
    let mut session: Session<Canned> = Session::new(ClientConfig::default());
    session.connect_with(Canned::new(vec![vec![1, 0, 0, 0, 1]])).unwrap();
    assert!(session.is_ready());

    let result = session.execute(&Command::Names);
    assert!(matches!(result, Err(ThinError::Io(_))));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_garbled_handshake_closes_session() {
    let canned = Canned::new(vec![vec![1, 0, 0, 0], vec![7]]);
    let mut session: Session<Canned> = Session::new(ClientConfig::default());
    assert!(matches!(session.connect_with(canned), Err(ThinError::Protocol(_))));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_oversized_response_closes_session() {
    let config = ClientConfig::builder().max_response_size(16).build();
    let canned = Canned::new(vec![
        vec![1, 0, 0, 0, 1],
        32i32.to_le_bytes().to_vec(),
        vec![0; 32],
    ]);
    let mut session: Session<Canned> = Session::new(config);
    session.connect_with(canned).unwrap();

    match session.execute(&Command::Names) {
        Err(ThinError::Protocol(message)) => assert!(message.contains("too large"), "{}", message),
        other => panic!("expected protocol error, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Closed);

    // The unread payload is never mistaken for the next response
    let next = session.execute(&Command::Size { cache: "c".into() });
    assert!(matches!(next, Err(ThinError::Protocol(message)) if message.contains("Closed")));
}

#[test]
fn test_negative_response_length_closes_session() {
    let canned = Canned::new(vec![vec![1, 0, 0, 0, 1], vec![0xFF, 0xFF, 0xFF, 0xFF]]);
    let mut session: Session<Canned> = Session::new(ClientConfig::default());
    session.connect_with(canned).unwrap();

    assert!(matches!(session.execute(&Command::Names), Err(ThinError::Protocol(_))));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_handshake_with_stray_bytes_is_accepted() {
    let canned = Canned::new(vec![vec![3, 0, 0, 0, 1, 0xAA, 0xBB]]);
    let mut session: Session<Canned> = Session::new(ClientConfig::default());
    session.connect_with(canned).unwrap();
    assert!(session.is_ready());
}
