//! Service kinds and the peer handshake.
//!
//! A peer declares which service kinds it offers and which it wants to
//! consume; a kind is only ever requested from a peer that offered it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::protocol::{Message, Payload};

/// The federated service kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// Content-addressed buffer storage.
    Buffer,
    /// Buffer classification metadata.
    BufferInfo,
    /// Transformation result caching.
    Transformation,
    /// Macro elision result caching.
    Elision,
}

impl ServiceKind {
    /// All kinds, in canonical order.
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::Buffer,
        ServiceKind::BufferInfo,
        ServiceKind::Transformation,
        ServiceKind::Elision,
    ];
}

/// What a peer offers and wants.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Handshake {
    /// Service kinds this peer serves.
    pub offered: Vec<ServiceKind>,
    /// Service kinds this peer wants to consume.
    pub consumed: Vec<ServiceKind>,
}

impl Handshake {
    /// A peer that offers and consumes everything.
    pub fn full() -> Self {
        Self {
            offered: ServiceKind::ALL.to_vec(),
            consumed: ServiceKind::ALL.to_vec(),
        }
    }

    /// Encodes the handshake as a request frame.
    pub fn to_message(&self, id: u32) -> Message {
        let metadata = serde_json::json!({"op": "handshake"});
        let body = serde_json::to_value(self).unwrap_or(Value::Null);
        Message::request(id, metadata, Payload::Json(body))
    }

    /// Reads a handshake back out of a frame payload.
    pub fn from_message(message: &Message) -> Option<Self> {
        match &message.payload {
            Payload::Json(value) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }
}

/// The kinds this side may request: what it consumes and the peer
/// offers, in canonical order.
pub fn negotiate(ours: &Handshake, theirs: &Handshake) -> Vec<ServiceKind> {
    let usable: Vec<ServiceKind> = ServiceKind::ALL
        .into_iter()
        .filter(|kind| ours.consumed.contains(kind) && theirs.offered.contains(kind))
        .collect();
    info!(?usable, "handshake negotiated");
    usable
}
