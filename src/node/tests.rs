use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::*;
use crate::blockchain::{Block, ChainState};
use crate::error::TxRejection;

/// Records dial attempts instead of opening sockets.
struct LoopbackTransport {
    dialed: Mutex<Vec<String>>,
    listening: AtomicBool,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self {
            dialed: Mutex::new(Vec::new()),
            listening: AtomicBool::new(true),
        }
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self, address: &str) {
        self.dialed.lock().unwrap().push(address.to_string());
    }

    fn close_listener(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

type TestNode = Node<LoopbackTransport>;

fn config(email: &str) -> NodeConfig {
    NodeConfig {
        http_host: "127.0.0.1".into(),
        http_port: 3001,
        p2p_port: 6001,
        initial_peers: Vec::new(),
        mail_address: email.into(),
        difficulty: 1,
        block_reward: 10,
    }
}

fn node(email: &str) -> TestNode {
    Node::new(&config(email), Wallet::generate(), LoopbackTransport::default())
}

/// Both directions of an in-memory connection between two nodes.
struct Link {
    a_to_b: mpsc::UnboundedReceiver<Message>,
    b_to_a: mpsc::UnboundedReceiver<Message>,
    /// How `a` knows `b`.
    b_id: PeerId,
    /// How `b` knows `a`.
    a_id: PeerId,
}

/// `a` dials `b`.
fn link(a: &mut TestNode, b: &mut TestNode, a_addr: &str, b_addr: &str) -> Link {
    let (ab_tx, a_to_b) = mpsc::unbounded_channel();
    let (ba_tx, b_to_a) = mpsc::unbounded_channel();
    let b_id = PeerId::new();
    let a_id = PeerId::new();
    a.handle_event(NodeEvent::PeerConnected {
        peer: b_id,
        address: b_addr.into(),
        outbox: ab_tx,
        direction: Direction::Outbound,
    });
    b.handle_event(NodeEvent::PeerConnected {
        peer: a_id,
        address: a_addr.into(),
        outbox: ba_tx,
        direction: Direction::Inbound,
    });
    Link {
        a_to_b,
        b_to_a,
        b_id,
        a_id,
    }
}

/// Deliver frames both ways until neither side has anything left to say.
fn pump(a: &mut TestNode, b: &mut TestNode, link: &mut Link) {
    loop {
        let mut moved = false;
        while let Ok(message) = link.a_to_b.try_recv() {
            b.handle_message(link.a_id, message);
            moved = true;
        }
        while let Ok(message) = link.b_to_a.try_recv() {
            a.handle_message(link.b_id, message);
            moved = true;
        }
        if !moved {
            break;
        }
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

/// Run one mining round to completion and apply the result.
async fn mine(node: &mut TestNode) -> Block {
    node.start_mining(None);
    let result = tokio::time::timeout(Duration::from_secs(10), node.mined_rx.recv())
        .await
        .expect("mining timed out")
        .expect("miner channel closed");
    node.on_block_mined(result);
    node.ledger().last_block().clone()
}

async fn submit(node: &mut TestNode, sender: &str, receiver: &str, amount: u64) -> SubmitResult {
    let (tx, rx) = oneshot::channel();
    let transfer = TransferRequest {
        sender: sender.into(),
        receiver: receiver.into(),
        amount,
        message: String::new(),
    };
    node.handle_control(ControlRequest::SubmitTransaction(transfer, tx));
    rx.await.unwrap()
}

#[tokio::test]
async fn mined_block_is_applied_and_gossiped() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    let mut l = link(&mut a, &mut b, "a", "b");
    pump(&mut a, &mut b, &mut l);

    let block = mine(&mut a).await;
    assert_eq!(a.ledger().len(), 2);
    assert!(!a.is_mining());
    pump(&mut a, &mut b, &mut l);

    assert_eq!(b.ledger().last_block(), &block);
    assert!(b.ledger().verify_integrity());
    assert_eq!(b.ledger().account_balance("a@x.com"), 10);
    assert_eq!(b.ledger().account_balance("SYSTEM"), -10);
}

#[tokio::test]
async fn heavier_remote_fork_is_adopted() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    mine(&mut a).await;
    mine(&mut a).await;
    mine(&mut b).await;

    let mut l = link(&mut a, &mut b, "a", "b");
    pump(&mut a, &mut b, &mut l);
    mine(&mut a).await;
    pump(&mut a, &mut b, &mut l);

    assert_eq!(b.ledger().chain(), a.ledger().chain());
    assert!(b.ledger().verify_integrity());
    assert_eq!(b.ledger().account_balance("b@x.com"), 0);
    assert_eq!(b.ledger().account_balance("a@x.com"), 30);
}

#[tokio::test]
async fn lighter_remote_fork_is_ignored_after_walking_back() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    mine(&mut a).await;
    for _ in 0..3 {
        mine(&mut b).await;
    }
    let before = b.ledger().chain().to_vec();

    let mut l = link(&mut a, &mut b, "a", "b");
    pump(&mut a, &mut b, &mut l);
    mine(&mut a).await;

    // a's new block reaches b; b asks for its second-to-last block, a lacks it.
    let announced = drain(&mut l.a_to_b);
    for message in announced {
        b.handle_message(l.a_id, message);
    }
    match drain(&mut l.b_to_a).as_slice() {
        [Message::CheckIfBlockExists(candidate)] => assert_eq!(candidate, &before[2]),
        other => panic!("unexpected frames {other:?}"),
    }
    a.handle_message(l.b_id, Message::CheckIfBlockExists(before[2].clone()));
    match drain(&mut l.a_to_b).as_slice() {
        [Message::BlockNotFound(block)] => assert_eq!(block, &before[2]),
        other => panic!("unexpected frames {other:?}"),
    }
    b.handle_message(l.a_id, Message::BlockNotFound(before[2].clone()));
    match drain(&mut l.b_to_a).as_slice() {
        [Message::CheckIfBlockExists(candidate)] => assert_eq!(candidate, &before[1]),
        other => panic!("unexpected frames {other:?}"),
    }

    // Let the rest of the walk play out: genesis is shared, a's suffix weighs 2 vs 3.
    b.handle_message(l.a_id, Message::BlockNotFound(before[1].clone()));
    pump(&mut a, &mut b, &mut l);

    assert_eq!(b.ledger().chain(), &before[..]);
    assert_eq!(a.ledger().len(), 3);
}

#[tokio::test]
async fn equal_work_favors_incoming_suffix() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    mine(&mut a).await;
    mine(&mut b).await;
    mine(&mut b).await;

    let mut l = link(&mut a, &mut b, "a", "b");
    pump(&mut a, &mut b, &mut l);
    mine(&mut a).await;
    pump(&mut a, &mut b, &mut l);

    assert_eq!(b.ledger().chain(), a.ledger().chain());
}

#[tokio::test]
async fn tampered_proposal_leaves_chain_untouched() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    mine(&mut a).await;
    mine(&mut a).await;
    mine(&mut b).await;
    let before = b.ledger().chain().to_vec();

    let mut l = link(&mut a, &mut b, "a", "b");
    pump(&mut a, &mut b, &mut l);

    let tip = a.ledger().last_block().clone();
    b.handle_message(l.a_id, Message::BlockMined(tip));
    assert!(matches!(
        drain(&mut l.b_to_a).as_slice(),
        [Message::CheckIfBlockExists(_)]
    ));

    let mut proposal = a.ledger().chain().to_vec();
    proposal[2].transactions[0].amount = 1_000_000;
    b.handle_message(l.a_id, Message::InsertLackingBlocks(proposal));

    assert_eq!(b.ledger().chain(), &before[..]);
    assert!(b.ledger().verify_integrity());
}

#[tokio::test]
async fn unsolicited_blocks_are_not_applied() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    mine(&mut a).await;
    mine(&mut a).await;
    let mut l = link(&mut a, &mut b, "a", "b");
    pump(&mut a, &mut b, &mut l);

    b.handle_message(l.a_id, Message::InsertLackingBlocks(a.ledger().chain().to_vec()));
    assert_eq!(b.ledger().len(), 1);
}

#[tokio::test]
async fn search_ending_at_genesis_is_abandoned() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    mine(&mut a).await;
    mine(&mut a).await;
    mine(&mut b).await;
    let mut l = link(&mut a, &mut b, "a", "b");
    pump(&mut a, &mut b, &mut l);

    b.handle_message(l.a_id, Message::BlockMined(a.ledger().last_block().clone()));
    drain(&mut l.b_to_a);

    // A peer claiming not to know genesis is a protocol violation; b stops asking.
    b.handle_message(l.a_id, Message::BlockNotFound(Block::genesis()));
    assert!(drain(&mut l.b_to_a).is_empty());

    b.handle_message(l.a_id, Message::InsertLackingBlocks(a.ledger().chain().to_vec()));
    assert_eq!(b.ledger().len(), 2);
    assert_eq!(b.peer_addresses(), vec!["a".to_string()]);
}

#[tokio::test]
async fn ancestor_search_gives_up_after_chain_length_steps() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    mine(&mut a).await;
    for _ in 0..3 {
        mine(&mut b).await;
    }
    let len = b.ledger().len();
    let tip = b.ledger().last_block().clone();

    let mut l = link(&mut a, &mut b, "a", "b");
    pump(&mut a, &mut b, &mut l);

    b.handle_message(l.a_id, Message::BlockMined(a.ledger().last_block().clone()));
    assert_eq!(drain(&mut l.b_to_a).len(), 1);

    // A peer that never recognises anything keeps pushing the search back.
    let mut rounds = 0;
    let mut follow_ups = 0;
    while b.ancestor_searches.contains_key(&l.a_id) {
        b.handle_message(l.a_id, Message::BlockNotFound(tip.clone()));
        let frames = drain(&mut l.b_to_a);
        assert!(frames.iter().all(|m| matches!(m, Message::CheckIfBlockExists(_))));
        follow_ups += frames.len();
        rounds += 1;
        assert!(rounds <= len, "search never terminated");
    }
    assert_eq!(follow_ups, len - 1);
    assert_eq!(rounds, len);
    assert!(!b.ancestor_searches.contains_key(&l.a_id));

    b.handle_message(l.a_id, Message::BlockNotFound(tip));
    assert!(drain(&mut l.b_to_a).is_empty());
    assert_eq!(b.ledger().len(), len);
    assert_eq!(b.peer_addresses(), vec!["a".to_string()]);
}

#[tokio::test]
async fn check_if_block_exists_answers_with_subchain() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    mine(&mut a).await;
    let mut l = link(&mut a, &mut b, "a", "b");
    pump(&mut a, &mut b, &mut l);

    a.handle_message(l.b_id, Message::CheckIfBlockExists(Block::genesis()));
    match drain(&mut l.a_to_b).as_slice() {
        [Message::InsertLackingBlocks(blocks)] => assert_eq!(blocks, a.ledger().chain()),
        other => panic!("unexpected frames {other:?}"),
    }
}

#[tokio::test]
async fn transactions_are_validated_and_gossiped() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    let mut l = link(&mut a, &mut b, "a", "b");
    mine(&mut a).await;
    pump(&mut a, &mut b, &mut l);

    let tx = submit(&mut a, "a@x.com", "c@x.com", 4).await.unwrap();
    pump(&mut a, &mut b, &mut l);
    assert_eq!(b.ledger().mempool(), std::slice::from_ref(&tx));

    assert_eq!(
        submit(&mut a, "a@x.com", "a@x.com", 1).await,
        Err(TxRejection::SelfTransfer)
    );
    assert_eq!(
        submit(&mut a, "a@x.com", "c@x.com", 7).await,
        Err(TxRejection::InsufficientFunds { balance: 10 })
    );

    // Mining the pending transfer commits it on both nodes and empties both mempools.
    mine(&mut a).await;
    pump(&mut a, &mut b, &mut l);
    assert!(a.ledger().mempool().is_empty());
    assert!(b.ledger().mempool().is_empty());
    assert_eq!(b.ledger().account_balance("c@x.com"), 4);
    assert_eq!(b.ledger().account_balance("a@x.com"), 16);
}

#[tokio::test]
async fn peer_transaction_with_forged_hash_is_dropped() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    let l = link(&mut a, &mut b, "a", "b");
    let mut tx = Transaction::create("SYSTEM", "x@x.com", 1, "", &Wallet::generate(), None);
    tx.amount = 2;
    b.handle_message(l.a_id, Message::TransactionAdded(tx));
    assert!(b.ledger().mempool().is_empty());
}

#[tokio::test]
async fn peer_block_cancels_in_flight_mining() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    let mut l = link(&mut a, &mut b, "a", "b");
    pump(&mut a, &mut b, &mut l);

    let block = mine(&mut b).await;
    drain(&mut l.b_to_a);

    a.start_mining(None);
    assert!(a.is_mining());
    a.handle_message(l.b_id, Message::BlockMined(block.clone()));
    assert!(!a.is_mining());
    assert_eq!(a.ledger().last_block(), &block);
}

#[tokio::test]
async fn majority_rejection_closes_listener() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    let mut c = node("c@x.com");
    let ab = link(&mut a, &mut b, "a", "b");
    let ac = link(&mut a, &mut c, "a", "c");

    a.handle_message(ab.b_id, Message::VerificationResponse(false));
    assert!(a.transport().is_listening());
    a.handle_message(ac.b_id, Message::VerificationResponse(false));
    assert!(!a.transport().is_listening());
}

#[tokio::test]
async fn honest_peers_accept_valid_identity() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    let mut l = link(&mut a, &mut b, "a", "b");

    let frames = drain(&mut l.a_to_b);
    assert!(matches!(frames[0], Message::LogInformation(_)));
    assert!(matches!(frames[1], Message::VerificationRequest(_)));
    for message in frames {
        b.handle_message(l.a_id, message);
    }
    assert!(
        drain(&mut l.b_to_a)
            .iter()
            .any(|m| *m == Message::VerificationResponse(true))
    );
    a.handle_message(l.b_id, Message::VerificationResponse(true));
    assert!(a.transport().is_listening());
}

#[tokio::test]
async fn disconnect_removes_peer_once() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    let l = link(&mut a, &mut b, "a", "b");
    a.handle_event(NodeEvent::PeerDisconnected { peer: l.b_id });
    a.handle_event(NodeEvent::PeerDisconnected { peer: l.b_id });
    assert!(a.peer_addresses().is_empty());

    // Frames from a removed peer are ignored.
    a.handle_message(l.b_id, Message::BlockMined(Block::genesis()));
    assert_eq!(a.ledger().len(), 1);
}

#[tokio::test]
async fn dead_outbox_drops_peer_on_broadcast() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    let l = link(&mut a, &mut b, "a", "b");
    drop(l.a_to_b);
    assert_eq!(a.broadcast(Message::LogInformation("anyone?".into())), 0);
    assert!(a.peer_addresses().is_empty());
}

#[tokio::test]
async fn duplicate_address_is_not_added_twice() {
    let mut a = node("a@x.com");
    let mut b = node("b@x.com");
    let _first = link(&mut a, &mut b, "a", "b");
    let _second = link(&mut a, &mut b, "a", "b");
    assert_eq!(a.peer_addresses(), vec!["b".to_string()]);
}

#[test]
fn add_peer_dials_through_transport() {
    let mut a = node("a@x.com");
    let (tx, _rx) = oneshot::channel();
    a.handle_control(ControlRequest::AddPeer("127.0.0.1:6002".into(), tx));
    assert_eq!(
        a.transport().dialed.lock().unwrap().as_slice(),
        ["127.0.0.1:6002".to_string()]
    );
}

#[tokio::test]
async fn handle_drives_the_running_node() {
    let node = Node::new(&config("a@x.com"), Wallet::generate(), LoopbackTransport::default());
    let (_events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, control_rx) = NodeHandle::channel(16);
    let task = tokio::spawn(node.run(events_rx, control_rx));

    assert!(handle.list_peers().await.unwrap().is_empty());
    assert!(handle.verify_integrity().await.unwrap());
    assert_eq!(handle.wallet().await.unwrap().address, "a@x.com");
    handle.add_peer("127.0.0.1:6002".into()).await.unwrap();

    handle.start_mining(None).await.unwrap();
    let mut state = handle.chain_state().await.unwrap();
    for _ in 0..200 {
        if state.chain.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
        state = handle.chain_state().await.unwrap();
    }
    assert_eq!(state.chain.len(), 2);
    assert_eq!(handle.balance("a@x.com".into()).await.unwrap(), 10);

    let reset = ChainState {
        chain: vec![Block::genesis()],
        difficulty: 2,
        block_reward: 5,
        mempool: Vec::new(),
    };
    handle.load_chain_state(reset.clone()).await.unwrap();
    assert_eq!(handle.chain_state().await.unwrap(), reset);
    assert_eq!(handle.broadcast("hi".into()).await.unwrap(), 0);

    drop(handle);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}
