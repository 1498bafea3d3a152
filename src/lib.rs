//! # ignite-thin
//!
//! A thin client for in-memory data-grid nodes speaking the binary thin
//! client protocol:
//! - Self-describing binary object codec for keys and values
//! - Table-driven packet layouts with routed responses
//! - Session handshake with optional authentication
//! - Thread pool fan-out over independent sessions
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Execution Pool                            │
//! │               (one Session per worker)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Session                                 │
//! │        (handshake, request ids, Command → Reply)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Protocol   │          │  Transport  │
//!   │(packet tbl) │          │    (TCP)    │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │   Binary    │
//!   │ (registry,  │
//!   │   codec)    │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod binary;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, ThinError};
pub use config::{ClientConfig, ProtocolVersion};
pub use binary::{BinaryType, Value, ValueMap};
pub use protocol::{Command, Reply, TypedValue};
pub use network::{ExecutionPool, PoolTask, Session, SessionState};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
