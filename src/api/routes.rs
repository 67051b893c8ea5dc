use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/chain/last", web::get().to(handlers::get_last_block))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/block", web::get().to(handlers::get_block))
            .route("/transactions", web::get().to(handlers::get_confirmed_transactions))
            .route("/transactions", web::post().to(handlers::submit_transaction))
            .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
            .route("/transactions/broadcast", web::post().to(handlers::broadcast_transaction))
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/blocks/receive", web::post().to(handlers::receive_block))
            .route("/nodes", web::get().to(handlers::list_peers))
            .route("/nodes/register", web::post().to(handlers::register_peer))
            .route("/sync", web::get().to(handlers::sync_chain))
            .route("/assets", web::get().to(handlers::get_assets))
            .route("/assets/{dna}", web::get().to(handlers::get_asset))
    );
}
