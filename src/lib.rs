//! Lodestone - MMORPG connection server
//!
//! Framing, flood control, per-connection queues and the stage-gated packet
//! dispatcher that sit between game clients and the world simulation.

/// Server configuration
pub mod config;
/// Shared server state
pub mod context;
/// Tick clock
pub mod core;
/// Diagnostics sink for connection events
pub mod diagnostics;
/// Framing, wire encoding, flood and IP guards
pub mod network;
/// Client and server packet catalogs
pub mod protocol;
/// Server implementations
pub mod servers;
/// Connections, the registry and per-connection queues
pub mod session;
/// Simulation boundary and the standalone lobby world
pub mod world;
