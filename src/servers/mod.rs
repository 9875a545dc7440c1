//! Server implementations
//!
//! - game: accept loop, tick loop and the packet handlers

pub mod game;
