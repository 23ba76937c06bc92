//! Domain layer - Core types, wire messages, and port definitions
//!
//! This module defines the view data model and the traits (ports) that the
//! cache, listener, and authority adapters implement.

pub mod messages;
pub mod ports;

pub use messages::*;
pub use ports::*;
