use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, BalanceResponse};
use super::unavailable;

#[get("/balance/{address}/")]
pub async fn get_balance(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let address = path.into_inner().0;
    match state.node.balance(address.clone()).await {
        Ok(balance) => HttpResponse::Ok().json(BalanceResponse { address, balance }),
        Err(e) => unavailable(e),
    }
}
