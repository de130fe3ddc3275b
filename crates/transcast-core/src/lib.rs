//! transcast-core: Core library for transcast
//!
//! This crate keeps several independently opened viewer windows showing the
//! same live translation run, revealed at a human-readable pace, without any
//! shared server-side session.
//!
//! # Architecture
//!
//! ```text
//! Producer ──► WindowHandle ──► WindowEngine ──┬──► ReconciliationStore (raw / rendered)
//!                                  ▲           ├──► RevealScheduler (one pending reveal)
//!                                  │           └──► RunLifecycle (Idle / Active + grace)
//!                                  │
//!              ChannelEndpoint ◄───┴───► BroadcastHub (named channel, fan-out)
//!                                  │
//!                                  └──► watch::Receiver<DisplaySnapshot> ──► surfaces
//! ```
//!
//! # Modules
//!
//! - `record`: The translation record and its identity
//! - `protocol`: Inter-window wire messages
//! - `transport`: Named broadcast channels shared by windows of one process
//! - `store`: Raw/rendered sequences with idempotent merges
//! - `pacing`: Reveal scheduler (single pending reveal)
//! - `lifecycle`: Active/Idle run signal with grace-delayed finalization
//! - `engine`: Per-window state machine composing the above (no I/O)
//! - `window`: Async window task and the producer/consumer handle
//! - `producer`: Upstream translation-service frame adapter
//! - `surface`: Display projections (fade-out linger, fixed grid)
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod pacing;
pub mod producer;
pub mod protocol;
pub mod record;
pub mod store;
pub mod surface;
pub mod transport;
pub mod window;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
