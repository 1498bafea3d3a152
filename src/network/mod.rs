//! Network Module
//!
//! Client connections to a server node.
//!
//! ## Architecture
//! - `Transport`: blocking byte pipe, TCP by default
//! - `Session`: handshake plus request/response exchange on one transport
//! - `ExecutionPool`: one session per worker thread, calls dealt round-robin

mod pool;
mod session;
mod transport;

pub use pool::{flatten_results, ExecutionPool, PoolTask, TaskOutcome};
pub use session::{Session, SessionState};
pub use transport::{TcpTransport, Transport};
