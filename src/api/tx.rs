use actix_web::{HttpResponse, Responder, post, web};

use super::models::{AppState, ErrorResponse, NewTxRequest};
use super::unavailable;
use crate::node::TransferRequest;

/// Sign a transfer with the node key and submit it to the mempool.
#[post("/transactions/")]
pub async fn post_transaction(
    state: web::Data<AppState>,
    body: web::Json<NewTxRequest>,
) -> impl Responder {
    let req = body.into_inner();
    let transfer = TransferRequest {
        sender: req.sender,
        receiver: req.receiver,
        amount: req.amount,
        message: req.message,
    };
    match state.node.submit_transaction(transfer).await {
        Ok(Ok(tx)) => HttpResponse::Created().json(tx),
        Ok(Err(reason)) => HttpResponse::BadRequest().json(ErrorResponse {
            error: reason.to_string(),
        }),
        Err(e) => unavailable(e),
    }
}
