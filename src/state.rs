//! Persistent State Store (spec.md §4.2): durable `current_term` and
//! `voted_for` for one peer.
//!
//! Grounded in the teacher crate's `Metadata` struct (`current_term`,
//! `voted_for`) in `protos.rs`, backed here by a `sled::Tree` the way
//! `pyraft.storage.StateStorage` backs the same two fields with a sqlite
//! table keyed by peer id.

use crate::errors::*;
use crate::protos::{PeerId, Term};

const KEY_CURRENT_TERM: &[u8] = b"current_term";
const KEY_VOTED_FOR: &[u8] = b"voted_for";

/// Escapes a peer id the way `pyraft.storage`'s `table_name` does, so it is
/// safe to use as a `sled::Tree` name / filesystem-adjacent identifier.
pub fn escape_peer_id(peer_id: &PeerId) -> String {
	peer_id.replace('.', "_").replace(':', "_")
}

pub struct PersistentState {
	tree: sled::Tree,
}

impl PersistentState {
	pub fn open(db: &sled::Db, peer_id: &PeerId) -> Result<Self> {
		let tree = db
			.open_tree(format!("state_{}", escape_peer_id(peer_id)))
			.chain_err(|| "opening state tree")?;
		Ok(PersistentState { tree })
	}

	/// `current_term`, defaulting to 0 if this is a fresh store (spec.md §3).
	pub fn current_term(&self) -> Result<Term> {
		match self.tree.get(KEY_CURRENT_TERM).chain_err(|| "reading current_term")? {
			Some(bytes) => Ok(decode_u64(&bytes)),
			None => Ok(0),
		}
	}

	/// Durably writes `current_term`. Must complete before any response at
	/// that term is emitted (spec.md §4.2).
	pub fn set_current_term(&self, term: Term) -> Result<()> {
		self.tree
			.insert(KEY_CURRENT_TERM, &term.to_be_bytes())
			.chain_err(|| "writing current_term")?;
		self.tree.flush().chain_err(|| "flushing current_term")?;
		Ok(())
	}

	/// `voted_for` in the current term, or `None` if this peer has not
	/// voted in it. Reset to `None` whenever `current_term` advances
	/// (spec.md §3, invariant I2) — the role engine is responsible for
	/// calling `clear_voted_for` whenever it bumps the term.
	pub fn voted_for(&self) -> Result<Option<PeerId>> {
		match self.tree.get(KEY_VOTED_FOR).chain_err(|| "reading voted_for")? {
			Some(bytes) => Ok(Some(
				String::from_utf8(bytes.to_vec()).chain_err(|| "decoding voted_for")?,
			)),
			None => Ok(None),
		}
	}

	/// Durably writes `voted_for`. Must be durable before a
	/// `RequestVoteResponse { vote_granted: true }` is sent (spec.md §4.2).
	pub fn set_voted_for(&self, candidate_id: &PeerId) -> Result<()> {
		self.tree
			.insert(KEY_VOTED_FOR, candidate_id.as_bytes())
			.chain_err(|| "writing voted_for")?;
		self.tree.flush().chain_err(|| "flushing voted_for")?;
		Ok(())
	}

	pub fn clear_voted_for(&self) -> Result<()> {
		self.tree.remove(KEY_VOTED_FOR).chain_err(|| "clearing voted_for")?;
		self.tree.flush().chain_err(|| "flushing cleared voted_for")?;
		Ok(())
	}
}

fn decode_u64(bytes: &[u8]) -> u64 {
	let mut buf = [0u8; 8];
	buf.copy_from_slice(&bytes[..8]);
	u64::from_be_bytes(buf)
}
