use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::{debug, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;
mod network;

use blockchain::{AccountId, Ledger, LedgerError, ProofOfWork, SnapshotStore};
use config::NodeConfig;
use network::{PeerClient, PeerRegistry};

// Open the ledger snapshot, starting a fresh chain when none exists
fn initialize_ledger(config: &NodeConfig) -> anyhow::Result<Ledger> {
    if let Some(dir) = config.data_file.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).unwrap_or_else(|e| {
                warn!("Failed to create data directory: {}", e);
            });
        }
    }

    let store = SnapshotStore::new(&config.data_file);
    let pow = ProofOfWork::new(config.difficulty);

    Ledger::open(store, pow)
        .with_context(|| format!("failed to open ledger at {}", config.data_file.display()))
}

// Join the network through the configured bootstrap node: register there,
// pull its peer list and introduce ourselves to everyone on it.
async fn bootstrap_peers(config: &NodeConfig, registry: &PeerRegistry, client: &PeerClient) {
    let bootstrap = match &config.bootstrap {
        Some(bootstrap) => bootstrap.clone(),
        None => return,
    };

    if let Err(e) = registry.register(&bootstrap) {
        warn!("not joining through {}: {}", bootstrap, e);
        return;
    }
    info!("joining the network through {}", bootstrap);

    if let Err(e) = client.register_with(&bootstrap, registry.self_address()).await {
        warn!("failed to register with bootstrap node {}: {}", bootstrap, e);
    }

    match client.get_peers(&bootstrap).await {
        Ok(peers) => {
            for peer in peers {
                match registry.register(&peer) {
                    Ok(false) => {
                        if let Err(e) = client.register_with(&peer, registry.self_address()).await {
                            warn!("failed to register with {}: {}", peer, e);
                        }
                    }
                    Ok(true) => {}
                    Err(e) => debug!("skipping peer {}: {}", peer, e),
                }
            }
        }
        Err(e) => warn!("failed to fetch peers from {}: {}", bootstrap, e),
    }

    info!("bootstrap finished, {} peers known", registry.len());
}

// Periodic chain sync, plus an optional self-mining loop
fn spawn_background_tasks(
    config: &NodeConfig,
    ledger: web::Data<Ledger>,
    registry: web::Data<PeerRegistry>,
    client: web::Data<PeerClient>,
) {
    {
        let ledger = ledger.clone();
        let registry = registry.clone();
        let client = client.clone();
        let interval = config.sync_interval;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                network::sync::replace_if_longer(client.get_ref(), &ledger, &registry).await;
            }
        });
    }

    if let Some(every) = config.auto_mine_interval {
        let miner = AccountId(config.miner_account.clone());

        tokio::spawn(async move {
            info!("auto-mining every {:?} into account {}", every, miner);
            loop {
                tokio::time::sleep(every).await;

                let worker = ledger.clone();
                let account = miner.clone();
                match tokio::task::spawn_blocking(move || worker.mine(&account)).await {
                    Ok(Ok(block)) => {
                        network::sync::broadcast_block(&client, &registry, &block).await;
                    }
                    Ok(Err(LedgerError::EmptyPool)) => {
                        debug!("nothing to mine");
                    }
                    Ok(Err(LedgerError::MiningInterrupted(_))) => break,
                    Ok(Err(e)) => warn!("auto-mining failed: {}", e),
                    Err(e) => warn!("auto-mining task failed: {}", e),
                }
            }
        });
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_last_block,
        api::handlers::validate_chain,
        api::handlers::get_block,
        api::handlers::get_confirmed_transactions,
        api::handlers::get_pending_transactions,
        api::handlers::submit_transaction,
        api::handlers::broadcast_transaction,
        api::handlers::mine_block,
        api::handlers::receive_block,
        api::handlers::register_peer,
        api::handlers::list_peers,
        api::handlers::sync_chain,
        api::handlers::get_assets,
        api::handlers::get_asset
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::Asset,
            blockchain::asset::Attribute,
            blockchain::AccountId,
            blockchain::chain::AssetSummary,
            blockchain::chain::AssetDetail,
            api::handlers::ChainResponse,
            api::handlers::TransactionResponse,
            api::handlers::MineRequest,
            api::handlers::MineResponse,
            api::handlers::RegisterPeerRequest,
            api::handlers::RegisterPeerResponse,
            api::handlers::SyncResponse
        )
    ),
    tags(
        (name = "nftchain", description = "NFT ledger node endpoints")
    ),
    info(
        title = "NFT Ledger API",
        version = "1.0.0",
        description = "An NFT ownership ledger with proof-of-work mining and peer gossip",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::from_env();

    let ledger = web::Data::new(initialize_ledger(&config)?);
    let registry = web::Data::new(PeerRegistry::new(config.public_url.clone()));
    let client = web::Data::new(PeerClient::new(config.secret.clone(), config.peer_timeout));

    bootstrap_peers(&config, &registry, &client).await;
    spawn_background_tasks(&config, ledger.clone(), registry.clone(), client.clone());

    let ledger_handle = ledger.clone();
    let config_data = web::Data::new(config.clone());

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    // Start HTTP server
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(ledger.clone())
            .app_data(registry.clone())
            .app_data(client.clone())
            .app_data(config_data.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    // Stop any proof-of-work search still running on the blocking pool
    ledger_handle.shutdown();
    Ok(())
}
