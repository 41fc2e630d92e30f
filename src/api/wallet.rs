use actix_web::{HttpResponse, Responder, get, web};

use super::models::AppState;
use super::unavailable;

/// The node's account address and public key.
#[get("/wallet/")]
pub async fn get_wallet(state: web::Data<AppState>) -> impl Responder {
    match state.node.wallet().await {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(e) => unavailable(e),
    }
}
