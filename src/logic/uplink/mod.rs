//! Collector Uplink Module
//!
//! Outbound traffic of the agent:
//! - `client.rs`: scan upload with retry, heartbeats
//! - `heartbeat.rs`: periodic presence loop
//! - `aux_push.rs`: raw file push to the local AI app
//! - `publisher.rs`: optional dashboard event batching

pub mod aux_push;
pub mod client;
pub mod heartbeat;
pub mod publisher;

pub use aux_push::{AuxPush, PushOutcome};
pub use client::{CollectorClient, CollectorTransport, ReqwestTransport, TransportError, UploadOutcome};
pub use heartbeat::{spawn_heartbeat_loop, HeartbeatHandle};
pub use publisher::{DashboardEvent, DashboardPublisher};
