use dashmap::DashSet;
use thiserror::Error;

/// Errors raised while registering a peer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("cannot register this node's own address")]
    SelfAddress,

    #[error("invalid peer address: {0}")]
    InvalidAddress(String),
}

/// The set of known peer base addresses, e.g. `http://10.0.0.2:8080`.
///
/// Addresses are kept normalized (no trailing slash) so the same peer
/// written two ways cannot register twice. The node's own address is held
/// separately and never enters the set.
#[derive(Debug)]
pub struct PeerRegistry {
    self_address: String,
    peers: DashSet<String>,
}

fn normalize(address: &str) -> &str {
    address.trim().trim_end_matches('/')
}

impl PeerRegistry {
    pub fn new(self_address: impl Into<String>) -> Self {
        let self_address = self_address.into();
        PeerRegistry {
            self_address: normalize(&self_address).to_string(),
            peers: DashSet::new(),
        }
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    /// Adds a peer address. Returns whether the peer was already known, so
    /// the caller can skip re-announcing it. Registering this node's own
    /// address is refused.
    pub fn register(&self, address: &str) -> Result<bool, PeerError> {
        let address = normalize(address);

        if address.is_empty() {
            return Err(PeerError::InvalidAddress("empty address".to_string()));
        }
        if !address.starts_with("http://") && !address.starts_with("https://") {
            return Err(PeerError::InvalidAddress(format!(
                "{} is not an http(s) base address",
                address
            )));
        }
        if address == self.self_address {
            return Err(PeerError::SelfAddress);
        }

        let inserted = self.peers.insert(address.to_string());
        Ok(!inserted)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers.contains(normalize(address))
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// All known peers in lexicographic order. Iteration order is fixed so
    /// that every node walks its peers the same way and chain-replacement
    /// ties resolve identically everywhere.
    pub fn peers_sorted(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.peers.iter().map(|p| p.key().clone()).collect();
        peers.sort();
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PeerRegistry {
        PeerRegistry::new("http://127.0.0.1:8080")
    }

    #[test]
    fn test_register_new_peer() {
        let registry = registry();
        let already_known = registry.register("http://127.0.0.1:8081").unwrap();

        assert!(!already_known);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("http://127.0.0.1:8081"));
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = registry();
        assert!(!registry.register("http://127.0.0.1:8081").unwrap());
        assert!(registry.register("http://127.0.0.1:8081").unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_trailing_slash_is_normalized() {
        let registry = registry();
        registry.register("http://127.0.0.1:8081/").unwrap();

        assert!(registry.contains("http://127.0.0.1:8081"));
        assert!(registry.register("http://127.0.0.1:8081").unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_own_address_is_refused() {
        let registry = registry();
        assert_eq!(registry.register("http://127.0.0.1:8080"), Err(PeerError::SelfAddress));
        assert_eq!(
            registry.register("http://127.0.0.1:8080/"),
            Err(PeerError::SelfAddress)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_addresses_are_refused() {
        let registry = registry();
        assert!(matches!(registry.register(""), Err(PeerError::InvalidAddress(_))));
        assert!(matches!(
            registry.register("127.0.0.1:8081"),
            Err(PeerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_peers_are_listed_sorted() {
        let registry = registry();
        registry.register("http://node-c:8080").unwrap();
        registry.register("http://node-a:8080").unwrap();
        registry.register("http://node-b:8080").unwrap();

        assert_eq!(
            registry.peers_sorted(),
            vec![
                "http://node-a:8080".to_string(),
                "http://node-b:8080".to_string(),
                "http://node-c:8080".to_string(),
            ]
        );
    }
}
