use actix_web::{HttpResponse, Responder, get, post, put, web};
use log::info;

use super::models::{AppState, MineRequest, MineResponse, ValidateResponse};
use super::unavailable;
use crate::blockchain::ChainState;

/// Chain, difficulty, reward and mempool as one snapshot.
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    match state.node.chain_state().await {
        Ok(snapshot) => HttpResponse::Ok().json(snapshot),
        Err(e) => unavailable(e),
    }
}

/// Replace the node's state wholesale.
#[put("/chain/")]
pub async fn load_chain(state: web::Data<AppState>, body: web::Json<ChainState>) -> impl Responder {
    let snapshot = body.into_inner();
    let height = snapshot.chain.len();
    match state.node.load_chain_state(snapshot).await {
        Ok(()) => {
            info!("API - chain state loaded ({height} blocks)");
            HttpResponse::NoContent().finish()
        }
        Err(e) => unavailable(e),
    }
}

#[get("/validate/")]
pub async fn validate_chain(state: web::Data<AppState>) -> impl Responder {
    match state.node.verify_integrity().await {
        Ok(valid) => HttpResponse::Ok().json(ValidateResponse { valid }),
        Err(e) => unavailable(e),
    }
}

/// Start mining in the background; the block is gossiped once sealed.
#[post("/mine/")]
pub async fn mine_block(
    state: web::Data<AppState>,
    body: Option<web::Json<MineRequest>>,
) -> impl Responder {
    let miner_address = body
        .map(|b| b.into_inner())
        .unwrap_or_default()
        .miner_address
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());
    match state.node.start_mining(miner_address).await {
        Ok(job) => HttpResponse::Accepted().json(MineResponse { job }),
        Err(e) => unavailable(e),
    }
}
