//! Remote Endpoint Listener
//!
//! Accepts pushes addressed to this client and dispatches them to the
//! client's update entry point, on its own task for the life of the
//! process.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
