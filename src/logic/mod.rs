//! Logic Module - Agent engines
//!
//! ## Layout
//! - `pe/` - PE header parsing and entry point disassembly
//! - `classifier/` - model backend, demo fallback, dispatcher
//! - `locator/` - collector discovery (last known, broadcast, candidates)
//! - `uplink/` - upload, heartbeat, aux push, dashboard publisher
//! - `queue/` + `pipeline` - serial task orchestration

// Shared
pub mod config;
pub mod events;
pub mod identity;
pub mod types;

// Per-file analysis
pub mod classifier;
pub mod hashing;
pub mod pe;

// Network
pub mod locator;
pub mod uplink;

// Orchestration
pub mod pipeline;
pub mod queue;
pub mod watcher;
