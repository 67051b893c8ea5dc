// Network module
//
// Everything a node needs to talk to other nodes:
// - HMAC request signing and verification
// - The peer registry
// - The outbound HTTP client
// - Gossip and longest-chain reconciliation

pub mod auth;
pub mod client;
pub mod peers;
pub mod sync;

pub use client::{ChainFetcher, PeerAnnouncer, PeerClient};
pub use peers::PeerRegistry;
