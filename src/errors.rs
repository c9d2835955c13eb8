//! Error taxonomy for the consensus core (spec.md §7).
//!
//! Kept as an `error_chain!` block the way the teacher crate's `lib.rs`
//! declares it (`pub mod errors { error_chain! { ... } }`), rather than
//! switching to a different error crate.

error_chain! {
	foreign_links {
		Io(::std::io::Error);
		Sled(::sled::Error);
		Encode(::rmp_serde::encode::Error);
		Decode(::rmp_serde::decode::Error);
	}

	errors {
		/// A store write failed. Per spec.md §7 this is fatal for the
		/// current handler: callers should treat it as a crash rather
		/// than silently acknowledging the request that triggered it.
		PersistenceError(msg: String) {
			description("persistence error")
			display("persistence error: {}", msg)
		}

		/// A key was requested from the persistent state store that has
		/// never been set.
		NotFound(key: String) {
			description("key not found")
			display("key not found: {}", key)
		}

		/// Raised to clients attempting writes on a non-leader peer.
		NotLeader(leader_hint: Option<String>) {
			description("not the leader")
			display("not the leader (hint: {:?})", leader_hint)
		}

		/// A log read was given out-of-range bounds.
		IndexOutOfRange(lo: u64, len: u64) {
			description("index out of range")
			display("index {} out of range (log has {} entries)", lo, len)
		}

		/// An inbound datagram could not be decoded into a known message.
		DecodeError(msg: String) {
			description("decode error")
			display("decode error: {}", msg)
		}

		/// A datagram could not be sent.
		TransportError(msg: String) {
			description("transport error")
			display("transport error: {}", msg)
		}
	}
}
