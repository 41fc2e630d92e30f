mod balance;
mod chain;
mod health;
pub mod models;
mod peers;
mod tx;
mod wallet;

use actix_web::HttpResponse;
use actix_web::web::{self, ServiceConfig};
use log::error;

use crate::error::NodeError;
pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::load_chain)
            .service(chain::validate_chain)
            .service(chain::mine_block)
            .service(tx::post_transaction)
            .service(balance::get_balance)
            .service(peers::list_peers)
            .service(peers::add_peer)
            .service(peers::p2p_info)
            .service(peers::broadcast)
            .service(wallet::get_wallet),
    );
}

/// The coordination loop is gone or dropped the request.
fn unavailable(e: NodeError) -> HttpResponse {
    error!("API - node unavailable: {e}");
    HttpResponse::ServiceUnavailable().json(models::ErrorResponse {
        error: e.to_string(),
    })
}
