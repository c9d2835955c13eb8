//! Tunables for the role engine (spec.md §4.5).
//!
//! Defaults mirror `pyraft.config.Settings`: a 300ms heartbeat, a
//! step-down threshold of 5 missed heartbeats, an election-interval
//! spread factor of 3, and a 3-entry append-entries batch cap.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RaftConfig {
	/// Leader heartbeat tick interval.
	pub heartbeat_interval: Duration,

	/// `T_stepdown = heartbeat_interval * missed_heartbeats_threshold`
	/// (spec.md §4.5, Follower role).
	pub missed_heartbeats_threshold: u32,

	/// Follower/Candidate election timeouts are drawn uniformly from
	/// `[T_stepdown, T_stepdown * election_interval_spread]`.
	pub election_interval_spread: u32,

	/// Caps `AppendEntries.entries.len()` (spec.md §8, boundary behaviours).
	pub batch_max: u64,
}

impl RaftConfig {
	pub fn step_down_interval(&self) -> Duration {
		self.heartbeat_interval * self.missed_heartbeats_threshold
	}

	pub fn election_interval_bounds(&self) -> (Duration, Duration) {
		let lo = self.step_down_interval();
		let hi = lo * self.election_interval_spread;
		(lo, hi)
	}
}

impl Default for RaftConfig {
	fn default() -> Self {
		RaftConfig {
			heartbeat_interval: Duration::from_millis(300),
			missed_heartbeats_threshold: 5,
			election_interval_spread: 3,
			batch_max: 3,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn step_down_interval_is_heartbeat_times_threshold() {
		let cfg = RaftConfig::default();
		assert_eq!(cfg.step_down_interval(), Duration::from_millis(1500));
	}

	#[test]
	fn election_bounds_span_step_down_to_spread_times_step_down() {
		let cfg = RaftConfig::default();
		let (lo, hi) = cfg.election_interval_bounds();
		assert_eq!(lo, Duration::from_millis(1500));
		assert_eq!(hi, Duration::from_millis(4500));
	}
}
