use actix_web::{HttpResponse, Responder, get, post, web};

use super::models::{
    AddPeerRequest, AppState, BroadcastRequest, BroadcastResponse, ErrorResponse, P2pResponse,
    PeersResponse,
};
use super::unavailable;

#[get("/peers/")]
pub async fn list_peers(state: web::Data<AppState>) -> impl Responder {
    match state.node.list_peers().await {
        Ok(peers) => HttpResponse::Ok().json(PeersResponse {
            size: peers.len(),
            peers,
        }),
        Err(e) => unavailable(e),
    }
}

/// Dial a peer; the handshake completes in the background.
#[post("/peers/")]
pub async fn add_peer(
    state: web::Data<AppState>,
    body: web::Json<AddPeerRequest>,
) -> impl Responder {
    let address = body.into_inner().address.trim().to_string();
    if address.is_empty() {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "address required".into(),
        });
    }
    match state.node.add_peer(address).await {
        Ok(()) => HttpResponse::Accepted().finish(),
        Err(e) => unavailable(e),
    }
}

#[post("/broadcast/")]
pub async fn broadcast(
    state: web::Data<AppState>,
    body: web::Json<BroadcastRequest>,
) -> impl Responder {
    match state.node.broadcast(body.into_inner().message).await {
        Ok(delivered) => HttpResponse::Ok().json(BroadcastResponse { delivered }),
        Err(e) => unavailable(e),
    }
}

/// Host and port of this node's gossip listener.
#[get("/p2p/")]
pub async fn p2p_info(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(P2pResponse {
        host: state.p2p_address.ip().to_string(),
        port: state.p2p_address.port(),
    })
}
