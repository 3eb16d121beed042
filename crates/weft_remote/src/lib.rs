//! Federation interfaces: the wire codec, the service handshake and an
//! in-process reference store.
//!
//! The cache and graph layers only see the [`RemoteStore`](weft_cache::RemoteStore)
//! trait; this crate supplies the protocol a networked implementation
//! speaks and a [`MemoryStore`] that stands in for a peer.

#![warn(missing_docs)]

pub mod client;
pub mod protocol;
pub mod service;

pub use client::MemoryStore;
pub use protocol::{decode, encode, Message, Mode, Payload, ProtocolError};
pub use service::{negotiate, Handshake, ServiceKind};
