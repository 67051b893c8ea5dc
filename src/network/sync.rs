use futures::future::join_all;
use log::{debug, info, warn};

use crate::blockchain::chain::validate_chain;
use crate::blockchain::{Block, Ledger, Transaction};

use super::client::{ChainFetcher, PeerAnnouncer, PeerClient};
use super::peers::{PeerError, PeerRegistry};

/// Longest-chain reconciliation.
///
/// Asks every registered peer for its chain and adopts the longest one that
/// is strictly longer than the local chain and passes validation. Peers are
/// visited in sorted address order and a candidate must beat the current
/// best strictly, so when several peers tie at the same length every node
/// settles on the chain of the lowest address. Unreachable or invalid peers
/// are logged and skipped. Returns whether the local chain was replaced.
///
/// The winning candidate must still be longer at the moment of the swap:
/// `Ledger::replace` re-checks the length under its write lock, so a block
/// mined while chains were being fetched is never discarded for a candidate
/// it has outgrown.
pub async fn replace_if_longer<F: ChainFetcher>(
    fetcher: &F,
    ledger: &Ledger,
    registry: &PeerRegistry,
) -> bool {
    let mut best_len = ledger.block_count();
    let mut best_chain: Option<Vec<Block>> = None;

    for peer in registry.peers_sorted() {
        let remote = match fetcher.fetch_chain(&peer).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!("failed to fetch chain from {}: {}", peer, e);
                continue;
            }
        };

        let length = remote.chain.len();
        if length <= best_len {
            continue;
        }

        if let Err(e) = validate_chain(&remote.chain, ledger.pow()) {
            warn!("peer {} offered an invalid chain: {}", peer, e);
            continue;
        }

        info!("peer {} holds a longer valid chain of length {}", peer, length);
        best_len = length;
        best_chain = Some(remote.chain);
    }

    let chain = match best_chain {
        Some(chain) => chain,
        None => {
            debug!("local chain of length {} is already the longest", best_len);
            return false;
        }
    };

    match ledger.replace(chain) {
        Ok(()) => {
            info!("adopted peer chain of length {}", best_len);
            true
        }
        Err(e) => {
            warn!("could not adopt peer chain: {}", e);
            false
        }
    }
}

/// Offers a freshly mined block to every registered peer. Failures are
/// logged and swallowed; gossip is best effort.
pub async fn broadcast_block(client: &PeerClient, registry: &PeerRegistry, block: &Block) {
    let peers = registry.peers_sorted();
    let deliveries = peers.iter().map(|peer| async move {
        if let Err(e) = client.send_block(peer, block).await {
            warn!("failed to offer block {} to {}: {}", block.index, peer, e);
        }
    });
    join_all(deliveries).await;
}

/// Relays a submitted transaction to every registered peer.
pub async fn broadcast_transaction(client: &PeerClient, registry: &PeerRegistry, tx: &Transaction) {
    let peers = registry.peers_sorted();
    let deliveries = peers.iter().map(|peer| async move {
        if let Err(e) = client.send_transaction(peer, tx).await {
            warn!("failed to relay transaction to {}: {}", peer, e);
        }
    });
    join_all(deliveries).await;
}

/// Tells every previously known peer about a newly registered address.
pub async fn announce_peer<A: PeerAnnouncer>(client: &A, registry: &PeerRegistry, new_peer: &str) {
    let targets: Vec<String> = registry
        .peers_sorted()
        .into_iter()
        .filter(|peer| peer != new_peer)
        .collect();

    let deliveries = targets.iter().map(|peer| async move {
        if let Err(e) = client.announce(peer, new_peer).await {
            warn!("failed to announce {} to {}: {}", new_peer, peer, e);
        }
    });
    join_all(deliveries).await;
}

/// Records a peer address offered over the registration endpoint and tells
/// the rest of the network about it. Gossip runs only for addresses not
/// already known; a repeated registration is a quiet no-op. Returns whether
/// the address was already registered.
pub async fn register_and_announce<A: PeerAnnouncer>(
    client: &A,
    registry: &PeerRegistry,
    address: &str,
) -> Result<bool, PeerError> {
    let already_known = registry.register(address)?;
    if !already_known {
        announce_peer(client, registry, address).await;
    }
    Ok(already_known)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::blockchain::transaction::AccountId;
    use crate::blockchain::{Asset, ProofOfWork, Transaction};
    use crate::network::client::{ClientError, RemoteChain};

    struct StubFetcher {
        chains: HashMap<String, RemoteChain>,
    }

    impl StubFetcher {
        fn new() -> Self {
            StubFetcher { chains: HashMap::new() }
        }

        fn serve(mut self, peer: &str, chain: Vec<Block>) -> Self {
            let remote = RemoteChain { length: chain.len(), chain };
            self.chains.insert(peer.to_string(), remote);
            self
        }
    }

    #[async_trait]
    impl ChainFetcher for StubFetcher {
        async fn fetch_chain(&self, peer: &str) -> Result<RemoteChain, ClientError> {
            self.chains
                .get(peer)
                .cloned()
                .ok_or(ClientError::Status(reqwest::StatusCode::NOT_FOUND))
        }
    }

    /// Mines two blocks on the shared ledger before answering, so the local
    /// head moves between the length snapshot and the replacement.
    struct RacingFetcher {
        ledger: Arc<Ledger>,
        chain: Vec<Block>,
    }

    #[async_trait]
    impl ChainFetcher for RacingFetcher {
        async fn fetch_chain(&self, _peer: &str) -> Result<RemoteChain, ClientError> {
            for dna in ["race-0", "race-1"] {
                self.ledger.submit(mint(dna, "alice")).unwrap();
                self.ledger.mine(&"miner".into()).unwrap();
            }
            Ok(RemoteChain {
                length: self.chain.len(),
                chain: self.chain.clone(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingAnnouncer {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl PeerAnnouncer for RecordingAnnouncer {
        async fn announce(&self, peer: &str, address: &str) -> Result<(), ClientError> {
            self.calls
                .lock()
                .unwrap()
                .push((peer.to_string(), address.to_string()));
            Ok(())
        }
    }

    fn mint(dna: &str, receiver: &str) -> Transaction {
        let asset = Asset {
            name: format!("Asset {}", dna),
            description: "test asset".into(),
            image: format!("ipfs://{}.png", dna),
            dna: dna.into(),
            edition: None,
            date: 0,
            attributes: vec![],
            compiler: None,
        };
        Transaction::new(AccountId::system(), receiver.into(), Some(asset), 0)
    }

    /// A ledger with `blocks` mined blocks on top of genesis.
    fn ledger_of_length(blocks: usize, dna_prefix: &str) -> Ledger {
        let ledger = Ledger::new(ProofOfWork::new(1));
        for i in 0..blocks {
            ledger
                .submit(mint(&format!("{}-{}", dna_prefix, i), "alice"))
                .unwrap();
            ledger.mine(&"miner".into()).unwrap();
        }
        ledger
    }

    fn registry_with(peers: &[&str]) -> PeerRegistry {
        let registry = PeerRegistry::new("http://127.0.0.1:8080");
        for peer in peers {
            registry.register(peer).unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_adopts_longer_valid_chain() {
        let local = ledger_of_length(2, "local");
        let remote = ledger_of_length(4, "remote");
        let fetcher = StubFetcher::new().serve("http://node-a:8080", remote.chain());
        let registry = registry_with(&["http://node-a:8080"]);

        let replaced = replace_if_longer(&fetcher, &local, &registry).await;

        assert!(replaced);
        assert_eq!(local.block_count(), 5);
        assert_eq!(local.chain(), remote.chain());
    }

    #[tokio::test]
    async fn test_ignores_equal_length_chain() {
        let local = ledger_of_length(1, "local");
        let remote = ledger_of_length(1, "remote");
        let fetcher = StubFetcher::new().serve("http://node-a:8080", remote.chain());
        let registry = registry_with(&["http://node-a:8080"]);

        let before = local.chain();
        let replaced = replace_if_longer(&fetcher, &local, &registry).await;

        assert!(!replaced);
        assert_eq!(local.chain(), before);
    }

    #[tokio::test]
    async fn test_never_adopts_shorter_chain() {
        let local = ledger_of_length(3, "local");
        let remote = ledger_of_length(1, "remote");
        let fetcher = StubFetcher::new().serve("http://node-a:8080", remote.chain());
        let registry = registry_with(&["http://node-a:8080"]);

        assert!(!replace_if_longer(&fetcher, &local, &registry).await);
        assert_eq!(local.block_count(), 4);
    }

    #[tokio::test]
    async fn test_blocks_mined_during_fetch_are_not_discarded() {
        let local = Arc::new(Ledger::new(ProofOfWork::new(1)));
        let remote = ledger_of_length(2, "remote");
        let fetcher = RacingFetcher {
            ledger: local.clone(),
            chain: remote.chain(),
        };
        let registry = registry_with(&["http://node-a:8080"]);

        // The peer offers 3 blocks against a local head of 1, but two more
        // local blocks land while the fetch is in flight.
        let replaced = replace_if_longer(&fetcher, &local, &registry).await;

        assert!(!replaced);
        assert_eq!(local.block_count(), 3);
    }

    #[tokio::test]
    async fn test_rejects_longer_invalid_chain() {
        let local = Ledger::new(ProofOfWork::new(1));
        let remote = ledger_of_length(2, "x");
        let mut forged = remote.chain();
        forged[1].previous_hash = "forged".into();

        let fetcher = StubFetcher::new().serve("http://node-a:8080", forged);
        let registry = registry_with(&["http://node-a:8080"]);

        assert!(!replace_if_longer(&fetcher, &local, &registry).await);
        assert_eq!(local.block_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_skipped() {
        let local = Ledger::new(ProofOfWork::new(1));
        let remote = ledger_of_length(2, "x");
        let fetcher = StubFetcher::new().serve("http://node-b:8080", remote.chain());
        let registry = registry_with(&["http://node-a:8080", "http://node-b:8080"]);

        // node-a is not served by the stub and acts unreachable.
        assert!(replace_if_longer(&fetcher, &local, &registry).await);
        assert_eq!(local.block_count(), 3);
    }

    #[tokio::test]
    async fn test_lowest_address_wins_length_tie() {
        let local = Ledger::new(ProofOfWork::new(1));
        let chain_a = ledger_of_length(2, "a").chain();
        let chain_b = ledger_of_length(2, "b").chain();

        let fetcher = StubFetcher::new()
            .serve("http://node-a:8080", chain_a.clone())
            .serve("http://node-b:8080", chain_b);
        let registry = registry_with(&["http://node-b:8080", "http://node-a:8080"]);

        assert!(replace_if_longer(&fetcher, &local, &registry).await);
        assert_eq!(local.chain(), chain_a);
    }

    #[tokio::test]
    async fn test_no_peers_means_no_change() {
        let local = ledger_of_length(1, "x");
        let fetcher = StubFetcher::new();
        let registry = registry_with(&[]);

        assert!(!replace_if_longer(&fetcher, &local, &registry).await);
        assert_eq!(local.block_count(), 2);
    }

    #[tokio::test]
    async fn test_first_registration_announces_to_other_peers() {
        let announcer = RecordingAnnouncer::default();
        let registry = registry_with(&["http://node-a:8080"]);

        let known = register_and_announce(&announcer, &registry, "http://node-b:8080")
            .await
            .unwrap();

        assert!(!known);
        let calls = announcer.calls.lock().unwrap();
        // Announced to node-a only; the new peer is not told about itself.
        assert_eq!(
            *calls,
            vec![("http://node-a:8080".to_string(), "http://node-b:8080".to_string())]
        );
    }

    #[tokio::test]
    async fn test_reregistration_does_not_announce_again() {
        let announcer = RecordingAnnouncer::default();
        let registry = registry_with(&["http://node-a:8080"]);

        let first = register_and_announce(&announcer, &registry, "http://node-b:8080")
            .await
            .unwrap();
        let second = register_and_announce(&announcer, &registry, "http://node-b:8080")
            .await
            .unwrap();

        assert!(!first);
        assert!(second);
        assert_eq!(announcer.calls.lock().unwrap().len(), 1);
    }
}
