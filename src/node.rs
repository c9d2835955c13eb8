//! Public facade (spec.md §4.6): wires the Peer I/O Facade, both persistent
//! stores, the state machine, and the role engine into one running peer,
//! and exposes the replicated key/value operations client code actually
//! calls.
//!
//! Grounded in `pyraft.state.State.get_value`/`set_value` and the teacher
//! crate's `main.rs` (`RaftRedisServer` wiring `Server`+`rpc::Client` into a
//! Redis-shaped demo). This facade keeps only the two KV operations spec.md
//! §4.6 asks for — no expiries, no pub-sub, no Redis protocol.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::cipher::Cipher;
use crate::config::RaftConfig;
use crate::consensus::{ConsensusLoop, ConsensusLoopArgs, Event, RoleListener};
use crate::errors::*;
use crate::log::PersistentLog;
use crate::protos::{Command, LogIndex, Message, PeerId};
use crate::rpc::Rpc;
use crate::state::PersistentState;
use crate::state_machine::{ApplyHandler, StateMachine};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything needed to start one peer. `id` doubles as this peer's bind
/// address (spec.md §6: peer ids are `host:port` strings used directly for
/// addressing and store namespacing).
pub struct NodeConfig {
	pub id: PeerId,
	pub peers: Vec<PeerId>,
	pub data_dir: PathBuf,
	pub cipher_key: Option<Vec<u8>>,
	pub raft_config: RaftConfig,
	pub apply_handler: Option<ApplyHandler>,
	pub on_follower: Option<RoleListener>,
	pub on_candidate: Option<RoleListener>,
	pub on_leader: Option<RoleListener>,
}

impl NodeConfig {
	pub fn new(id: impl Into<PeerId>, peers: Vec<PeerId>, data_dir: impl Into<PathBuf>) -> Self {
		NodeConfig {
			id: id.into(),
			peers,
			data_dir: data_dir.into(),
			cipher_key: None,
			raft_config: RaftConfig::default(),
			apply_handler: None,
			on_follower: None,
			on_candidate: None,
			on_leader: None,
		}
	}
}

pub struct Node {
	id: PeerId,
	event_tx: mpsc::Sender<Event>,
	leader_rx: watch::Receiver<Option<PeerId>>,
}

impl Node {
	/// Opens the on-disk stores, binds the UDP socket, and spawns the role
	/// engine's event loop as a background task. The returned `Node` is a
	/// thin handle onto that task; dropping every clone of it simply lets
	/// the underlying task run on with nothing left that can call into it.
	pub async fn start(cfg: NodeConfig) -> Result<Arc<Node>> {
		std::fs::create_dir_all(&cfg.data_dir).chain_err(|| "creating data directory")?;
		let db = sled::open(&cfg.data_dir).chain_err(|| "opening sled database")?;

		let state_store = PersistentState::open(&db, &cfg.id)?;
		let log = PersistentLog::open(&db, &cfg.id)?;
		let mut state_machine = StateMachine::new();
		if let Some(handler) = cfg.apply_handler {
			state_machine.set_apply_handler(handler);
		}

		let cipher = cfg
			.cipher_key
			.as_deref()
			.map(|k| Arc::new(Cipher::from_shared_secret(k)));
		let rpc = Arc::new(Rpc::bind(&cfg.id, cipher).await?);

		let (event_tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
		let (leader_tx, leader_rx) = watch::channel(None);

		let (inbound_tx, mut inbound_rx) = mpsc::channel::<(Message, PeerId)>(EVENT_CHANNEL_CAPACITY);
		rpc.clone().spawn_receive_loop(inbound_tx);
		let forward_tx = event_tx.clone();
		tokio::spawn(async move {
			while let Some((msg, sender)) = inbound_rx.recv().await {
				if forward_tx.send(Event::Inbound(msg, sender)).await.is_err() {
					return;
				}
			}
		});

		let consensus_loop = ConsensusLoop::new(ConsensusLoopArgs {
			id: cfg.id.clone(),
			peers: cfg.peers,
			config: cfg.raft_config,
			state_store,
			log,
			state_machine,
			rpc,
			leader_tx,
			event_tx: event_tx.clone(),
			rx,
			on_follower: cfg.on_follower,
			on_candidate: cfg.on_candidate,
			on_leader: cfg.on_leader,
		});
		tokio::spawn(consensus_loop.run());

		Ok(Arc::new(Node {
			id: cfg.id,
			event_tx,
			leader_rx,
		}))
	}

	pub fn id(&self) -> &PeerId {
		&self.id
	}

	/// Updates with the peer currently believed to be leader (or `None`).
	/// The ambient equivalent of `pyraft.state.State.wait_until_leader`
	/// (spec.md §4.5 supplement) — client code awaits a change on this
	/// rather than polling `set_value` until it stops returning `NotLeader`.
	pub fn leader_id_stream(&self) -> watch::Receiver<Option<PeerId>> {
		self.leader_rx.clone()
	}

	/// Proposes `{key: value}` as a single command. Resolves to the
	/// committed log index once applied; returns `NotLeader` immediately
	/// if this peer is not the leader (spec.md §4.6).
	pub async fn set_value(&self, key: impl Into<String>, value: serde_json::Value) -> Result<LogIndex> {
		let mut command = Command::new();
		command.insert(key.into(), value);

		let (tx, rx) = oneshot::channel();
		self.event_tx
			.send(Event::Execute(command, tx))
			.await
			.map_err(|_| Error::from("the role engine has shut down"))?;
		rx.await.map_err(|_| Error::from("the role engine dropped the pending apply"))?
	}

	/// Reads `key` from the local state machine directly — a stale,
	/// non-linearizable read; spec.md explicitly excludes read-index
	/// linearizable reads as a non-goal.
	pub async fn get_value(&self, key: impl Into<String>) -> Result<Option<serde_json::Value>> {
		let (tx, rx) = oneshot::channel();
		self.event_tx
			.send(Event::GetValue(key.into(), tx))
			.await
			.map_err(|_| Error::from("the role engine has shut down"))?;
		Ok(rx.await.map_err(|_| Error::from("the role engine dropped the get_value reply"))?)
	}
}
