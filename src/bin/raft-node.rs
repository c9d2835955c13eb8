//! Thin CLI driver (spec.md §6 supplement): starts one peer and otherwise
//! gets out of the way. Grounded in the teacher crate's `main.rs` (a `clap`
//! `App` parsing a peer list) and `pyraft.run`'s
//! `host:port,host:port,...` convention for describing a cluster on one
//! command line, modernized to `clap` v4 derive.

use std::path::PathBuf;

use clap::Parser;
use raft_core::{Node, NodeConfig};

#[derive(Parser, Debug)]
#[command(name = "raft-node", about = "Runs one peer of a raft-core cluster")]
struct Args {
	/// Every peer's host:port in the cluster, including this one, in a
	/// fixed order shared by all peers on the command line.
	#[arg(long, value_delimiter = ',', required = true)]
	peers: Vec<String>,

	/// Index into --peers naming the address this process binds to.
	#[arg(long)]
	index: usize,

	/// Base directory for this peer's persistent state and log trees.
	#[arg(long, default_value = "./raft-data")]
	data_dir: PathBuf,

	/// Shared secret enabling AES-256-GCM encryption of every datagram.
	/// Omit to run unencrypted.
	#[arg(long)]
	cipher_key: Option<String>,
}

#[tokio::main]
async fn main() -> raft_core::errors::Result<()> {
	tracing_subscriber::fmt::init();
	let args = Args::parse();

	if args.index >= args.peers.len() {
		return Err(format!(
			"--index {} out of range for {} peers in --peers",
			args.index,
			args.peers.len()
		)
		.into());
	}

	let id = args.peers[args.index].clone();
	let peers: Vec<String> = args
		.peers
		.iter()
		.enumerate()
		.filter(|(i, _)| *i != args.index)
		.map(|(_, p)| p.clone())
		.collect();
	let data_dir = args.data_dir.join(format!("peer-{}", args.index));

	let mut cfg = NodeConfig::new(id.clone(), peers, data_dir);
	cfg.cipher_key = args.cipher_key.map(String::into_bytes);

	let node = Node::start(cfg).await?;
	tracing::info!(id = %node.id(), "raft-node started");

	let mut leader_rx = node.leader_id_stream();
	tokio::spawn(async move {
		while leader_rx.changed().await.is_ok() {
			let leader = leader_rx.borrow().clone();
			tracing::info!(?leader, "leader changed");
		}
	});

	// Long-running service; the role engine's own task keeps it alive.
	std::future::pending::<()>().await;
	Ok(())
}
