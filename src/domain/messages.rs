//! Wire Messages
//!
//! JSON request/response bodies exchanged between clients and the
//! authority. Both roles share these so the protocol has one definition.

use crate::domain::ports::{CallableAddress, View};
use serde::{Deserialize, Serialize};

// =============================================================================
// Paths
// =============================================================================

/// Client registration (authority side)
pub const CLIENTS_PATH: &str = "/v1/clients";

/// Canonical view fetch and put (authority side)
pub const VIEW_PATH: &str = "/v1/view";

/// Push delivery (client listener side)
pub const UPDATE_PATH: &str = "/v1/view/update";

// =============================================================================
// Client -> Authority
// =============================================================================

/// Registration of a client's callable address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub address: CallableAddress,
}

/// Acknowledgement of a registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub address: CallableAddress,
    /// False when the address was already registered
    pub newly_registered: bool,
}

/// Whole-view write-through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutRequest {
    pub view: View,
    /// Registered address of the writer, excluded from fan-out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<CallableAddress>,
}

/// Acknowledgement of a put, with the fan-out outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PutResponse {
    pub delivered: usize,
    pub failed: usize,
    #[serde(default)]
    pub removed: Vec<CallableAddress>,
}

/// Registered client as listed by the authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfoResponse {
    pub address: CallableAddress,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub last_delivery_at: Option<chrono::DateTime<chrono::Utc>>,
    pub consecutive_failures: u32,
}

// =============================================================================
// Authority -> Client
// =============================================================================

/// Pushed view replacing the client's cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub view: View,
}

/// Delivery confirmation returned by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub accepted: bool,
}

// =============================================================================
// Errors
// =============================================================================

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }
}
