//! Loopback test server
//!
//! In-process stand-in for a data-grid node: accepts thin client
//! connections on an ephemeral port and serves the cache operations from
//! in-memory maps shared by every connection.
//!
//! A GET of a missing key answers with an error status so tests can observe
//! remote failures.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::BufMut;
use parking_lot::Mutex;

use ignite_thin::binary::{decode_entry, serialize, Value};
use ignite_thin::protocol::java_hash_code;
use ignite_thin::{ClientConfig, ProtocolVersion};

pub const AUTH_FAILURE: &str = "The user name or password is incorrect [userName=ignite]";
pub const STATUS_FAILED: i32 = 1;

// =============================================================================
// Options and Shared State
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Version the server speaks; other majors are rejected
    pub version: ProtocolVersion,

    /// Required credentials, if authentication is enabled
    pub credentials: Option<(String, String)>,

    /// Answer every request with a different request id
    pub mismatch_request_ids: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::V1_0_0,
            credentials: None,
            mismatch_request_ids: false,
        }
    }
}

#[derive(Default)]
struct Cache {
    name: Option<String>,
    entries: BTreeMap<Value, Value>,
}

#[derive(Default)]
struct Store {
    caches: HashMap<i32, Cache>,
    /// Unsent rows and page size per open scan cursor
    cursors: HashMap<i64, (Vec<(Value, Value)>, usize)>,
    next_cursor: i64,
    /// Request ids seen, in arrival order
    request_ids: Vec<u64>,
}

impl Store {
    fn cache(&mut self, id: i32) -> &mut Cache {
        self.caches.entry(id).or_default()
    }
}

// =============================================================================
// Server
// =============================================================================

pub struct TestServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
    store: Arc<Mutex<Store>>,
    acceptor: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::with_options(ServerOptions::default())
    }

    pub fn with_options(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(Mutex::new(Store::default()));

        let acceptor = {
            let shutdown = Arc::clone(&shutdown);
            let connections = Arc::clone(&connections);
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    if shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(stream) = stream else { continue };
                    connections.fetch_add(1, Ordering::SeqCst);
                    let store = Arc::clone(&store);
                    let options = options.clone();
                    thread::spawn(move || {
                        let _ = serve(stream, &options, &store);
                    });
                }
            })
        };

        Self {
            addr,
            shutdown,
            connections,
            store,
            acceptor: Some(acceptor),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Client config pointing at this server
    pub fn config(&self) -> ClientConfig {
        ClientConfig::builder()
            .host("127.0.0.1")
            .port(self.port())
            .read_timeout_ms(5_000)
            .write_timeout_ms(5_000)
            .build()
    }

    /// Connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Request ids received so far, in arrival order
    pub fn request_ids(&self) -> Vec<u64> {
        self.store.lock().request_ids.clone()
    }

    /// Entry count of a cache, read directly from the store
    pub fn entry_count(&self, cache: &str) -> usize {
        self.store
            .lock()
            .caches
            .get(&java_hash_code(cache))
            .map(|c| c.entries.len())
            .unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the acceptor
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
        }
    }
}

// =============================================================================
// Connection Handling
// =============================================================================

fn serve(mut stream: TcpStream, options: &ServerOptions, store: &Mutex<Store>) -> io::Result<()> {
    let Some(hello) = read_frame(&mut stream)? else {
        return Ok(());
    };
    let accepted = handshake(&hello, options);
    write_frame(&mut stream, &accepted.1)?;
    if !accepted.0 {
        return Ok(());
    }

    while let Some(request) = read_frame(&mut stream)? {
        let mut reader = Reader::new(&request);
        let op = reader.i16();
        let request_id = reader.u64();
        store.lock().request_ids.push(request_id);

        let (status, body) = match handle(op, &mut reader, store) {
            Ok(body) => (0, body),
            Err(message) => (STATUS_FAILED, serialize(&Value::String(message)).unwrap_or_default()),
        };

        let echoed = if options.mismatch_request_ids { request_id.wrapping_add(1) } else { request_id };
        let mut response = Vec::new();
        response.put_u64_le(echoed);
        response.put_i32_le(status);
        response.extend_from_slice(&body);
        write_frame(&mut stream, &response)?;
    }
    Ok(())
}

/// Returns (accepted, response payload)
fn handshake(payload: &[u8], options: &ServerOptions) -> (bool, Vec<u8>) {
    let mut reader = Reader::new(payload);
    let _request_code = reader.u8();
    let major = reader.u16();
    let _minor = reader.u16();
    let _patch = reader.u16();
    let _client_code = reader.u8();

    let offered = if reader.remaining() > 0 {
        let username = reader.value();
        let password = reader.value();
        Some((username, password))
    } else {
        None
    };

    if major != options.version.major {
        return (false, rejection(options.version, "Unsupported version."));
    }

    if let Some((user, pass)) = &options.credentials {
        let matches = matches!(
            &offered,
            Some((Value::String(u), Value::String(p))) if u == user && p == pass
        );
        if !matches {
            return (false, rejection(options.version, AUTH_FAILURE));
        }
    }
    (true, vec![1])
}

fn rejection(version: ProtocolVersion, message: &str) -> Vec<u8> {
    let mut out = vec![0];
    out.put_u16_le(version.major);
    out.put_u16_le(version.minor);
    out.put_u16_le(version.patch);
    out.extend_from_slice(&serialize(&Value::from(message)).unwrap_or_default());
    out
}

/// Serve one operation; `Err` carries the error message for a failed status
fn handle(op: i16, reader: &mut Reader, store: &Mutex<Store>) -> Result<Vec<u8>, String> {
    let mut store = store.lock();
    let mut out = Vec::new();

    match op {
        1000 => {
            let (id, key) = (reader.cache_header(), reader.value());
            let value = store
                .cache(id)
                .entries
                .get(&key)
                .cloned()
                .ok_or_else(|| format!("Key not found: {}", key))?;
            out.extend(encode(&value));
        }
        1001 => {
            let (id, key, value) = (reader.cache_header(), reader.value(), reader.value());
            store.cache(id).entries.insert(key, value);
        }
        1003 => {
            let id = reader.cache_header();
            let keys = reader.values();
            let cache = store.cache(id);
            let found: Vec<(Value, Value)> = keys
                .into_iter()
                .filter_map(|key| cache.entries.get(&key).cloned().map(|value| (key, value)))
                .collect();
            write_rows(&mut out, &found);
        }
        1004 => {
            let id = reader.cache_header();
            let count = reader.i32();
            for _ in 0..count {
                let (key, value) = (reader.value(), reader.value());
                store.cache(id).entries.insert(key, value);
            }
        }
        1011 => {
            let (id, key) = (reader.cache_header(), reader.value());
            out.put_u8(store.cache(id).entries.contains_key(&key) as u8);
        }
        1012 => {
            let id = reader.cache_header();
            let keys = reader.values();
            let cache = store.cache(id);
            out.put_u8(keys.iter().all(|key| cache.entries.contains_key(key)) as u8);
        }
        1013 | 1019 => {
            let id = reader.cache_header();
            store.cache(id).entries.clear();
        }
        1014 => {
            let (id, key) = (reader.cache_header(), reader.value());
            store.cache(id).entries.remove(&key);
        }
        1016 => {
            let (id, key) = (reader.cache_header(), reader.value());
            out.put_u8(store.cache(id).entries.remove(&key).is_some() as u8);
        }
        1020 => {
            let id = reader.cache_header();
            let _peek_modes = reader.i32();
            out.put_i64_le(store.cache(id).entries.len() as i64);
        }
        1050 => {
            let mut names: Vec<&String> = store.caches.values().filter_map(|c| c.name.as_ref()).collect();
            names.sort_by(|a, b| b.cmp(a));
            out.put_i32_le(names.len() as i32);
            for name in names {
                out.extend(encode(&Value::String(name.clone())));
            }
        }
        1051 => {
            let name = match reader.value() {
                Value::String(name) => name,
                other => return Err(format!("Cache name must be a string: {}", other)),
            };
            let id = java_hash_code(&name);
            if store.caches.get(&id).is_some_and(|c| c.name.is_some()) {
                return Err(format!("Cache already exists: {}", name));
            }
            store.cache(id).name = Some(name);
        }
        1056 => {
            let id = reader.i32();
            if store.caches.remove(&id).is_none() {
                return Err(format!("Cache does not exist [cacheId={}]", id));
            }
        }
        2000 => {
            let id = reader.cache_header();
            let _filter = reader.value();
            let _platform = reader.u8();
            let page_size = reader.i32().max(1) as usize;
            let _partition = reader.i32();
            let _local = reader.u8();

            let rows: Vec<(Value, Value)> = store
                .cache(id)
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            store.next_cursor += 1;
            let cursor_id = store.next_cursor;
            out.put_i64_le(cursor_id);
            let rest = write_page(&mut out, rows, page_size);
            store.cursors.insert(cursor_id, (rest, page_size));
        }
        2001 => {
            let cursor_id = reader.i64();
            let (rows, page_size) = store
                .cursors
                .remove(&cursor_id)
                .ok_or_else(|| format!("Resource does not exist: {}", cursor_id))?;
            let rest = write_page(&mut out, rows, page_size);
            store.cursors.insert(cursor_id, (rest, page_size));
        }
        0 => {
            let resource_id = reader.i64();
            store
                .cursors
                .remove(&resource_id)
                .ok_or_else(|| format!("Resource does not exist: {}", resource_id))?;
        }
        other => return Err(format!("Unsupported operation: {}", other)),
    }
    Ok(out)
}

/// Count, rows and the trailing more-pages byte; returns the unsent rows
fn write_page(out: &mut Vec<u8>, mut rows: Vec<(Value, Value)>, page_size: usize) -> Vec<(Value, Value)> {
    let rest = if rows.len() > page_size { rows.split_off(page_size) } else { Vec::new() };
    write_rows(out, &rows);
    out.put_u8(!rest.is_empty() as u8);
    rest
}

fn write_rows(out: &mut Vec<u8>, rows: &[(Value, Value)]) {
    out.put_i32_le(rows.len() as i32);
    for (key, value) in rows {
        out.extend(encode(key));
        out.extend(encode(value));
    }
}

fn encode(value: &Value) -> Vec<u8> {
    serialize(value).expect("test server values encode")
}

// =============================================================================
// Framing
// =============================================================================

fn read_frame(stream: &mut TcpStream) -> io::Result<Option<Vec<u8>>> {
    let mut len = [0u8; 4];
    match stream.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let mut payload = vec![0u8; i32::from_le_bytes(len) as usize];
    stream.read_exact(&mut payload)?;
    Ok(Some(payload))
}

fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> io::Result<()> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.put_i32_le(payload.len() as i32);
    frame.extend_from_slice(payload);
    stream.write_all(&frame)?;
    stream.flush()
}

/// Cursor over a request payload; panics on malformed input
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    /// Cache id followed by the flags byte
    fn cache_header(&mut self) -> i32 {
        let id = self.i32();
        let _flags = self.u8();
        id
    }

    fn value(&mut self) -> Value {
        let (value, next) = decode_entry(self.buf, self.pos, None, None).expect("valid binary object");
        self.pos = next;
        value
    }

    /// Count-prefixed run of binary objects
    fn values(&mut self) -> Vec<Value> {
        let count = self.i32();
        (0..count).map(|_| self.value()).collect()
    }
}
