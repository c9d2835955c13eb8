//! Persistent Log Store (spec.md §4.3): a 1-indexed durable append-only
//! list of `LogEntry` with prefix-preserving erase and ranged reads.
//!
//! Grounded in the teacher crate's `LogEntry`/`LogIndex` types and in
//! `pyraft.storage.LogsStorage` (a sqlite table keyed by an auto-increment
//! `idx`, with `get_items`/`append_items`/`erase_from`). Backed here by a
//! `sled::Tree` keyed by big-endian `u64` so that `range` scans come back
//! in index order for free.

use crate::errors::*;
use crate::protos::{LogEntry, LogIndex, PeerId, Term};

pub struct PersistentLog {
	tree: sled::Tree,
}

impl PersistentLog {
	pub fn open(db: &sled::Db, peer_id: &PeerId) -> Result<Self> {
		let tree = db
			.open_tree(format!("log_{}", crate::state::escape_peer_id(peer_id)))
			.chain_err(|| "opening log tree")?;
		Ok(PersistentLog { tree })
	}

	fn key(index: LogIndex) -> [u8; 8] {
		index.to_be_bytes()
	}

	/// Number of entries currently stored; `last_log_index` per spec.md §4.3.
	pub fn len(&self) -> Result<LogIndex> {
		Ok(self.tree.len() as LogIndex)
	}

	pub fn is_empty(&self) -> Result<bool> {
		Ok(self.len()? == 0)
	}

	/// `last_log_term`: term of the last entry, or 0 if the log is empty.
	pub fn last_log_term(&self) -> Result<Term> {
		let len = self.len()?;
		if len == 0 {
			return Ok(0);
		}
		Ok(self.get(len)?.map(|e| e.term).unwrap_or(0))
	}

	pub fn get(&self, index: LogIndex) -> Result<Option<LogEntry>> {
		if index == 0 {
			return Ok(None);
		}
		match self.tree.get(Self::key(index)).chain_err(|| "reading log entry")? {
			Some(bytes) => {
				let entry: LogEntry = rmp_serde::from_slice(&bytes).chain_err(|| "decoding log entry")?;
				Ok(Some(entry))
			}
			None => Ok(None),
		}
	}

	pub fn append(&self, entry: LogEntry) -> Result<LogIndex> {
		self.append_many(std::iter::once(entry))
	}

	/// Atomically appends in order. A crash mid-batch is allowed to leave a
	/// partial append provided the survivors form an unbroken prefix
	/// (spec.md §4.3) — a single `sled::Batch` gives us that for free since
	/// `sled` only ever applies a batch as a whole.
	pub fn append_many(&self, entries: impl IntoIterator<Item = LogEntry>) -> Result<LogIndex> {
		let mut next_index = self.len()?;
		let mut batch = sled::Batch::default();
		for entry in entries {
			next_index += 1;
			let bytes = rmp_serde::to_vec_named(&entry).chain_err(|| "encoding log entry")?;
			batch.insert(&Self::key(next_index), bytes);
		}
		self.tree.apply_batch(batch).chain_err(|| "appending log entries")?;
		self.tree.flush().chain_err(|| "flushing appended log entries")?;
		Ok(next_index)
	}

	/// Returns entries with indices in `[lo, hi]`. `hi` is clipped to
	/// `len()`. Errors if `lo > len()` (spec.md §4.3).
	pub fn range(&self, lo: LogIndex, hi: LogIndex) -> Result<Vec<LogEntry>> {
		let len = self.len()?;
		if lo == 0 {
			return Ok(vec![]);
		}
		if lo > len {
			return Err(ErrorKind::IndexOutOfRange(lo, len).into());
		}
		let hi = hi.min(len);
		if hi < lo {
			return Ok(vec![]);
		}

		let mut out = Vec::with_capacity((hi - lo + 1) as usize);
		for (_, bytes) in self
			.tree
			.range(Self::key(lo)..=Self::key(hi))
			.filter_map(|r| r.ok())
		{
			out.push(rmp_serde::from_slice(&bytes).chain_err(|| "decoding log entry")?);
		}
		Ok(out)
	}

	/// Removes every entry with index > `i`. Durable before any response
	/// acknowledging an overwrite is sent (spec.md §4.3).
	pub fn erase_suffix_from(&self, i: LogIndex) -> Result<()> {
		let len = self.len()?;
		let mut batch = sled::Batch::default();
		for index in (i + 1)..=len {
			batch.remove(&Self::key(index));
		}
		self.tree.apply_batch(batch).chain_err(|| "erasing log suffix")?;
		self.tree.flush().chain_err(|| "flushing erased log suffix")?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn open_log() -> PersistentLog {
		let db = sled::Config::new().temporary(true).open().unwrap();
		PersistentLog::open(&db, &"127.0.0.1:9001".to_string()).unwrap()
	}

	fn entry(term: Term) -> LogEntry {
		LogEntry {
			term,
			command: Default::default(),
		}
	}

	#[test]
	fn empty_log_has_zero_index_and_term() {
		let log = open_log();
        assert_eq!(log.len().unwrap(), 0);
		assert_eq!(log.last_log_term().unwrap(), 0);
	}

	#[test]
	fn append_many_then_range_returns_entries_in_order() {
		let log = open_log();
		let xs = vec![entry(1), entry(1), entry(2)];
		log.append_many(xs.clone()).unwrap();
		let got = log.range(1, log.len().unwrap()).unwrap();
		assert_eq!(got, xs);
	}

	#[test]
	fn erase_suffix_then_range_returns_the_prefix() {
		let log = open_log();
		let xs = vec![entry(1), entry(1), entry(2)];
		log.append_many(xs.clone()).unwrap();
		log.erase_suffix_from(1).unwrap();
		assert_eq!(log.len().unwrap(), 1);
		let got = log.range(1, log.len().unwrap()).unwrap();
		assert_eq!(got, xs[..1]);
	}

	#[test]
	fn range_with_lo_past_the_end_errors() {
		let log = open_log();
		log.append(entry(1)).unwrap();
		assert!(log.range(5, 10).is_err());
	}

	#[test]
	fn range_clips_hi_to_len() {
		let log = open_log();
		let xs = vec![entry(1), entry(2)];
		log.append_many(xs.clone()).unwrap();
		let got = log.range(1, 100).unwrap();
		assert_eq!(got, xs);
	}
}
