//! Wire-level message types (spec.md §4.5, §6).
//!
//! Field layout follows the teacher crate's `protos.rs` conventions
//! (`ServerId`/`Term`/`LogIndex` type aliases, a `LogEntry` struct carrying
//! `term` and an opaque payload) adapted to this spec's peer addressing
//! (`host:port` strings, per spec.md §6) and message set.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Uniquely identifies a peer as `host:port`. Spec.md §6 uses this same
/// string directly as the namespace key for the two persistent stores.
pub type PeerId = String;

pub type Term = u64;

/// 1-indexed per spec.md §3; index 0 means "before the start of the log".
pub type LogIndex = u64;

/// Correlates a batch of heartbeat-triggered `AppendEntries` with their
/// responses (spec.md §4.5, Leader role).
pub type RequestId = u64;

/// An application-defined key/value update. Spec.md §3 describes `command`
/// as "a mapping treated as literal by the core"; `serde_json::Value` lets
/// the default state machine merge it without the core knowing its shape.
pub type Command = HashMap<String, serde_json::Value>;

/// `(term, command)` per spec.md §3. The log's position gives the index;
/// entries never carry their own index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
	pub term: Term,
	pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVote {
	pub term: Term,
	pub candidate_id: PeerId,
	pub last_log_index: LogIndex,
	pub last_log_term: Term,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteResponse {
	pub term: Term,
	pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntries {
	pub term: Term,
	pub leader_id: PeerId,
	pub prev_log_index: LogIndex,
	pub prev_log_term: Term,
	pub entries: Vec<LogEntry>,
	pub leader_commit: LogIndex,
	pub request_id: RequestId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
	pub term: Term,
	pub success: bool,
	pub last_log_index: LogIndex,
	pub last_log_term: Term,
	pub request_id: RequestId,
}

/// The self-describing, externally-tagged message envelope (spec.md §6):
/// the `type` field is the serde tag and matches the wire names spec.md
/// enumerates (`request_vote`, `request_vote_response`, `append_entries`,
/// `append_entries_response`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
	#[serde(rename = "request_vote")]
	RequestVote(RequestVote),
	#[serde(rename = "request_vote_response")]
	RequestVoteResponse(RequestVoteResponse),
	#[serde(rename = "append_entries")]
	AppendEntries(AppendEntries),
	#[serde(rename = "append_entries_response")]
	AppendEntriesResponse(AppendEntriesResponse),
}

impl Message {
	pub fn term(&self) -> Term {
		match self {
			Message::RequestVote(m) => m.term,
			Message::RequestVoteResponse(m) => m.term,
			Message::AppendEntries(m) => m.term,
			Message::AppendEntriesResponse(m) => m.term,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encode_then_decode_round_trips() {
		let msg = Message::AppendEntries(AppendEntries {
			term: 3,
			leader_id: "10.0.0.1:9000".into(),
			prev_log_index: 4,
			prev_log_term: 2,
			entries: vec![LogEntry {
				term: 3,
				command: Command::from([("x".to_string(), serde_json::json!(1))]),
			}],
			leader_commit: 4,
			request_id: 7,
		});

		let bytes = rmp_serde::to_vec_named(&msg).unwrap();
		let decoded: Message = rmp_serde::from_slice(&bytes).unwrap();

		match (msg, decoded) {
			(Message::AppendEntries(a), Message::AppendEntries(b)) => {
				assert_eq!(a.term, b.term);
				assert_eq!(a.leader_id, b.leader_id);
				assert_eq!(a.prev_log_index, b.prev_log_index);
				assert_eq!(a.prev_log_term, b.prev_log_term);
				assert_eq!(a.entries, b.entries);
				assert_eq!(a.leader_commit, b.leader_commit);
				assert_eq!(a.request_id, b.request_id);
			}
			_ => panic!("variant changed across the wire"),
		}
	}

	#[test]
	fn unknown_type_tag_fails_to_decode_rather_than_panicking() {
		let mut map = std::collections::BTreeMap::new();
		map.insert("type".to_string(), serde_json::json!("install_snapshot"));
		let bytes = rmp_serde::to_vec_named(&map).unwrap();
		let decoded: Result<Message, _> = rmp_serde::from_slice(&bytes);
		assert!(decoded.is_err());
	}
}
