use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::warn;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::chain::{AssetDetail, AssetSummary};
use crate::blockchain::transaction::AccountId;
use crate::blockchain::{Block, Ledger, LedgerError, Transaction};
use crate::config::NodeConfig;
use crate::network::auth::{self, SignatureError};
use crate::network::{sync, PeerClient, PeerRegistry};

/// Shared ledger state
pub type LedgerData = web::Data<Ledger>;

/// Shared peer registry
pub type RegistryData = web::Data<PeerRegistry>;

/// Shared outbound HTTP client
pub type ClientData = web::Data<PeerClient>;

/// Shared node configuration
pub type ConfigData = web::Data<NodeConfig>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The number of blocks in the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,
}

/// Response for the transaction submission endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The index of the block that will include this transaction
    pub block_index: u64,
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// The account credited with the mining reward
    pub miner_address: String,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Request for the node registration endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterPeerRequest {
    /// Base address of the node to register, e.g. `http://10.0.0.2:8080`
    pub address: String,
}

/// Response for the node registration endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterPeerResponse {
    /// The message
    pub message: String,

    /// Every peer this node now knows about
    pub total_nodes: Vec<String>,
}

/// Response for the sync endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    /// The message
    pub message: String,

    /// Whether the local chain was replaced
    pub replaced: bool,

    /// The chain length after the sync
    pub length: usize,
}

/// Query parameters for the block lookup endpoint
#[derive(Deserialize)]
pub struct BlockQuery {
    pub index: Option<u64>,
    pub hash: Option<String>,
}

fn unauthorized(err: SignatureError) -> HttpResponse {
    HttpResponse::Unauthorized().json(serde_json::json!({
        "error": err.to_string()
    }))
}

/// Checks the `X-Signature` header against the raw body bytes. Handlers on
/// signed routes extract `web::Bytes` instead of `web::Json` so the bytes
/// verified here are exactly the bytes the peer signed.
fn check_signature(req: &HttpRequest, body: &[u8], config: &NodeConfig) -> Result<(), HttpResponse> {
    let header = match req.headers().get(auth::SIGNATURE_HEADER) {
        Some(header) => header,
        None => return Err(unauthorized(SignatureError::Missing)),
    };

    let signature = match header.to_str() {
        Ok(signature) => signature,
        Err(_) => return Err(unauthorized(SignatureError::Malformed)),
    };

    auth::verify(body, signature, &config.secret).map_err(unauthorized)
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, HttpResponse> {
    serde_json::from_slice(body).map_err(|e| {
        HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("invalid request body: {}", e)
        }))
    })
}

fn ledger_error_response(err: &LedgerError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    match err {
        LedgerError::Snapshot(_) => HttpResponse::InternalServerError().json(body),
        LedgerError::MiningInterrupted(_) => HttpResponse::ServiceUnavailable().json(body),
        _ => HttpResponse::BadRequest().json(body),
    }
}

/// The ownership rule enforced ahead of the pool: an owned asset only moves
/// at its owner's request, and an asset nobody owns yet can only be minted
/// by `SYSTEM`. Returns the rejection reason, or `None` for a clean pass.
fn ownership_violation(ledger: &Ledger, tx: &Transaction) -> Option<String> {
    let asset = tx.asset.as_ref()?;
    match ledger.owner_of(&asset.dna) {
        Some(owner) if owner != tx.sender => Some(format!(
            "account {} does not own asset {}",
            tx.sender, asset.dna
        )),
        None if !tx.sender.is_system() => Some(format!(
            "asset {} does not exist yet, only SYSTEM can mint it",
            asset.dna
        )),
        _ => None,
    }
}

/// Get the full chain
///
/// Returns every block and the chain length. Peers poll this endpoint
/// during chain synchronization.
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(ledger: LedgerData) -> impl Responder {
    let chain = ledger.chain();
    let response = ChainResponse {
        length: chain.len(),
        chain,
    };

    HttpResponse::Ok().json(response)
}

/// Get the latest block
///
/// Returns the block at the head of the chain
#[utoipa::path(
    get,
    path = "/api/v1/chain/last",
    responses(
        (status = 200, description = "Latest block retrieved successfully", body = Block)
    )
)]
pub async fn get_last_block(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.last_block())
}

/// Check if the chain is valid
///
/// Validates every link of the local chain
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Chain validation status", body = bool)
    )
)]
pub async fn validate_chain(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.is_valid())
}

/// Look up a single block
///
/// Finds a block by `index` or by `hash` query parameter. When both are
/// given, `index` wins.
#[utoipa::path(
    get,
    path = "/api/v1/block",
    responses(
        (status = 200, description = "Block found", body = Block),
        (status = 400, description = "Neither index nor hash given"),
        (status = 404, description = "No block matches")
    )
)]
pub async fn get_block(ledger: LedgerData, query: web::Query<BlockQuery>) -> impl Responder {
    let found = match (&query.index, &query.hash) {
        (Some(index), _) => ledger.block_by_index(*index),
        (None, Some(hash)) => ledger.block_by_hash(hash),
        (None, None) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "provide an index or hash query parameter"
            }));
        }
    };

    match found {
        Some(block) => HttpResponse::Ok().json(block),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": "no block matches the query"
        })),
    }
}

/// Get all confirmed transactions
///
/// Returns every transaction already sealed in a block, in chain order
#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    responses(
        (status = 200, description = "Confirmed transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_confirmed_transactions(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.confirmed_transactions())
}

/// Get all pending transactions
///
/// Returns the transactions waiting to be mined into a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.pending())
}

/// Submit a transaction
///
/// Queues a transaction for the next block. Transfers must come from the
/// asset's current owner; unknown assets can only be minted by `SYSTEM`.
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = Transaction,
    responses(
        (status = 201, description = "Transaction queued", body = TransactionResponse),
        (status = 400, description = "Invalid transaction"),
        (status = 401, description = "Missing or invalid signature")
    )
)]
pub async fn submit_transaction(
    req: HttpRequest,
    body: web::Bytes,
    ledger: LedgerData,
    config: ConfigData,
) -> impl Responder {
    if let Err(response) = check_signature(&req, &body, &config) {
        return response;
    }

    let tx: Transaction = match parse_json(&body) {
        Ok(tx) => tx,
        Err(response) => return response,
    };

    if let Some(reason) = ownership_violation(&ledger, &tx) {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": reason }));
    }

    match ledger.submit(tx) {
        Ok(block_index) => HttpResponse::Created().json(TransactionResponse {
            message: "Transaction will be added to the next block".to_string(),
            block_index,
        }),
        Err(err) => ledger_error_response(&err),
    }
}

/// Submit and relay a transaction
///
/// Queues a transaction locally, then forwards it verbatim to every known
/// peer so each computes the same transaction identifier.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/broadcast",
    request_body = Transaction,
    responses(
        (status = 201, description = "Transaction queued and relayed", body = TransactionResponse),
        (status = 400, description = "Invalid transaction"),
        (status = 401, description = "Missing or invalid signature")
    )
)]
pub async fn broadcast_transaction(
    req: HttpRequest,
    body: web::Bytes,
    ledger: LedgerData,
    registry: RegistryData,
    client: ClientData,
    config: ConfigData,
) -> impl Responder {
    if let Err(response) = check_signature(&req, &body, &config) {
        return response;
    }

    let tx: Transaction = match parse_json(&body) {
        Ok(tx) => tx,
        Err(response) => return response,
    };

    if let Some(reason) = ownership_violation(&ledger, &tx) {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": reason }));
    }

    match ledger.submit(tx.clone()) {
        Ok(block_index) => {
            sync::broadcast_transaction(&client, &registry, &tx).await;
            HttpResponse::Created().json(TransactionResponse {
                message: format!("Transaction queued and relayed to {} peers", registry.len()),
                block_index,
            })
        }
        Err(err) => ledger_error_response(&err),
    }
}

/// Mine a new block
///
/// Seals all pending transactions plus a mining reward into a new block,
/// offers it to every peer and then checks whether anyone got ahead.
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Nothing to mine"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 503, description = "Mining was interrupted")
    )
)]
pub async fn mine_block(
    req: HttpRequest,
    body: web::Bytes,
    ledger: LedgerData,
    registry: RegistryData,
    client: ClientData,
    config: ConfigData,
) -> impl Responder {
    if let Err(response) = check_signature(&req, &body, &config) {
        return response;
    }

    let mine_req: MineRequest = match parse_json(&body) {
        Ok(mine_req) => mine_req,
        Err(response) => return response,
    };

    let miner = AccountId(mine_req.miner_address);
    let worker = ledger.clone();
    let mined = web::block(move || worker.mine(&miner)).await;

    let block = match mined {
        Ok(Ok(block)) => block,
        Ok(Err(err)) => return ledger_error_response(&err),
        Err(_) => {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "mining task failed"
            }));
        }
    };

    sync::broadcast_block(&client, &registry, &block).await;
    // Someone may have sealed this position first; settle it now rather
    // than waiting for the periodic sync.
    sync::replace_if_longer(client.get_ref(), &ledger, &registry).await;

    HttpResponse::Ok().json(MineResponse {
        message: "New block mined".to_string(),
        block,
    })
}

/// Receive a block mined by a peer
///
/// Appends the block when it continues the local chain. A block that does
/// not fit triggers a full chain sync before the rejection is final.
#[utoipa::path(
    post,
    path = "/api/v1/blocks/receive",
    request_body = Block,
    responses(
        (status = 200, description = "Block appended or chain replaced"),
        (status = 400, description = "Block rejected"),
        (status = 401, description = "Missing or invalid signature")
    )
)]
pub async fn receive_block(
    req: HttpRequest,
    body: web::Bytes,
    ledger: LedgerData,
    registry: RegistryData,
    client: ClientData,
    config: ConfigData,
) -> impl Responder {
    if let Err(response) = check_signature(&req, &body, &config) {
        return response;
    }

    let block: Block = match parse_json(&body) {
        Ok(block) => block,
        Err(response) => return response,
    };

    let index = block.index;
    match ledger.append_external(block) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "message": format!("Block {} appended", index)
        })),
        Err(err @ LedgerError::Snapshot(_)) => ledger_error_response(&err),
        Err(err) => {
            warn!("rejected peer block {}: {}", index, err);
            if sync::replace_if_longer(client.get_ref(), &ledger, &registry).await {
                HttpResponse::Ok().json(serde_json::json!({
                    "message": "Chain replaced by a longer peer chain"
                }))
            } else {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": format!("rejected block: {}", err)
                }))
            }
        }
    }
}

/// Register a peer node
///
/// Adds the address to the registry. A first-time registration is announced
/// to every other known peer; registering again is a no-op.
#[utoipa::path(
    post,
    path = "/api/v1/nodes/register",
    request_body = RegisterPeerRequest,
    responses(
        (status = 200, description = "Node registered", body = RegisterPeerResponse),
        (status = 400, description = "Invalid or own address"),
        (status = 401, description = "Missing or invalid signature")
    )
)]
pub async fn register_peer(
    req: HttpRequest,
    body: web::Bytes,
    registry: RegistryData,
    client: ClientData,
    config: ConfigData,
) -> impl Responder {
    if let Err(response) = check_signature(&req, &body, &config) {
        return response;
    }

    let register_req: RegisterPeerRequest = match parse_json(&body) {
        Ok(register_req) => register_req,
        Err(response) => return response,
    };

    match sync::register_and_announce(client.get_ref(), &registry, &register_req.address).await {
        Ok(already_known) => {
            let message = if already_known {
                "Node was already registered".to_string()
            } else {
                "Node registered".to_string()
            };

            HttpResponse::Ok().json(RegisterPeerResponse {
                message,
                total_nodes: registry.peers_sorted(),
            })
        }
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": err.to_string()
        })),
    }
}

/// List known peer nodes
///
/// Returns every registered peer address. Signed with an empty body.
#[utoipa::path(
    get,
    path = "/api/v1/nodes",
    responses(
        (status = 200, description = "Peer list retrieved successfully", body = Vec<String>),
        (status = 401, description = "Missing or invalid signature")
    )
)]
pub async fn list_peers(
    req: HttpRequest,
    body: web::Bytes,
    registry: RegistryData,
    config: ConfigData,
) -> impl Responder {
    if let Err(response) = check_signature(&req, &body, &config) {
        return response;
    }

    HttpResponse::Ok().json(registry.peers_sorted())
}

/// Synchronize with peers
///
/// Runs longest-chain reconciliation against every registered peer
#[utoipa::path(
    get,
    path = "/api/v1/sync",
    responses(
        (status = 200, description = "Sync finished", body = SyncResponse)
    )
)]
pub async fn sync_chain(
    ledger: LedgerData,
    registry: RegistryData,
    client: ClientData,
) -> impl Responder {
    let replaced = sync::replace_if_longer(client.get_ref(), &ledger, &registry).await;

    let message = if replaced {
        "Chain replaced by a longer peer chain".to_string()
    } else {
        "Local chain is up to date".to_string()
    };

    HttpResponse::Ok().json(SyncResponse {
        message,
        replaced,
        length: ledger.block_count(),
    })
}

/// List all assets
///
/// Returns every minted asset with its current owner and latest price
#[utoipa::path(
    get,
    path = "/api/v1/assets",
    responses(
        (status = 200, description = "Assets retrieved successfully", body = Vec<AssetSummary>)
    )
)]
pub async fn get_assets(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.assets())
}

/// Look up one asset by dna
///
/// Returns the asset's metadata, current owner, latest price and the block
/// it last changed hands in
#[utoipa::path(
    get,
    path = "/api/v1/assets/{dna}",
    responses(
        (status = 200, description = "Asset found", body = AssetDetail),
        (status = 404, description = "No confirmed transaction mentions this dna")
    )
)]
pub async fn get_asset(ledger: LedgerData, dna: web::Path<String>) -> impl Responder {
    match ledger.asset_detail(&dna.into_inner()) {
        Some(detail) => HttpResponse::Ok().json(detail),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": "unknown asset"
        })),
    }
}
