use std::io;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;
use tokio::sync::mpsc;

use gossip_ledger::api::{self, AppState};
use gossip_ledger::config::NodeConfig;
use gossip_ledger::network::TcpTransport;
use gossip_ledger::node::{Node, NodeHandle};
use gossip_ledger::wallet::Wallet;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = NodeConfig::from_env().map_err(io::Error::other)?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = TcpTransport::bind(&config.p2p_address(), events_tx)
        .await
        .map_err(io::Error::other)?;
    let p2p_address = transport.local_addr();
    info!("⛓️ Gossip listener on {p2p_address}");

    let (handle, control_rx) = NodeHandle::channel(64);
    let node = Node::new(&config, Wallet::generate(), transport);
    for peer in &config.initial_peers {
        node.connect(peer);
    }
    tokio::spawn(node.run(events_rx, control_rx));

    info!(
        "⛓️ Starting node API at http://{}:{} for {}",
        config.http_host, config.http_port, config.mail_address
    );

    let state = web::Data::new(AppState {
        node: handle,
        p2p_address,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((config.http_host.as_str(), config.http_port))?
    .run()
    .await
}
