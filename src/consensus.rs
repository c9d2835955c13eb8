//! Role Engine (spec.md §4.5): the Follower/Candidate/Leader state machine
//! that owns election and replication.
//!
//! This is the teacher crate's `consensus` module re-expressed for this
//! spec's timer-driven role objects rather than the teacher's own
//! externally-cycled `ConsensusModule`/`Tick` design (the teacher offloads
//! scheduling to a caller-driven `cycle()`; this spec instead wants each
//! role to own real timers, matching `pyraft.state`'s
//! `Follower`/`Candidate`/`Leader` classes). Naming of the shared types
//! (`PeerId`, `Term`, `LogIndex`) is kept from the teacher's `protos.rs`.
//!
//! Concurrency model (spec.md §5): everything here runs on one logical
//! owner, a single task draining `rx` in arrival order. Timer fires and
//! inbound datagrams are both funnelled into the same channel as `Event`s,
//! so there is never more than one handler or timer callback mutating
//! `ConsensusLoop`'s fields at a time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::RaftConfig;
use crate::errors::*;
use crate::log::PersistentLog;
use crate::protos::*;
use crate::rpc::Rpc;
use crate::state::PersistentState;
use crate::state_machine::StateMachine;
use crate::timer::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
	Follower,
	Candidate,
	Leader,
}

/// Passed to role-change listeners. Purely observational, never on the
/// critical path of a handler.
#[derive(Debug, Clone)]
pub struct RoleSnapshot {
	pub id: PeerId,
	pub term: Term,
	pub role: RoleKind,
}

pub type RoleListener = Arc<dyn Fn(RoleSnapshot) + Send + Sync>;

/// Completion of a proposed command: resolves `Ok(index)` once the entry at
/// `index` is applied, or `Err` immediately if this peer was not the
/// leader. Per spec.md §5, if the leader steps down before the entry
/// commits, this sender is simply dropped along with the rest of
/// `LeaderState` — the receiving half then resolves to a cancellation
/// error rather than hanging forever, which is the safe Rust analogue of
/// "the future may remain unresolved" (see DESIGN.md).
pub(crate) type ApplyReply = oneshot::Sender<std::result::Result<LogIndex, Error>>;

pub(crate) enum Event {
	Inbound(Message, PeerId),
	ElectionTimeout,
	HeartbeatTick,
	StepDownTimeout,
	Execute(Command, ApplyReply),
	GetValue(String, oneshot::Sender<Option<serde_json::Value>>),
}

struct FollowerState {
	election_timer: Timer,
	leader_id: Option<PeerId>,
}

struct CandidateState {
	election_timer: Timer,
	vote_count: usize,
}

struct LeaderState {
	heartbeat_timer: Timer,
	step_down_timer: Timer,
	next_index: HashMap<PeerId, LogIndex>,
	match_index: HashMap<PeerId, LogIndex>,
	response_set: HashMap<RequestId, HashSet<PeerId>>,
	pending_apply: HashMap<LogIndex, ApplyReply>,
	request_id: RequestId,
}

enum Role {
	Follower(FollowerState),
	Candidate(CandidateState),
	Leader(LeaderState),
}

/// Runs as a single task; owns every piece of mutable peer state exclusively
/// (spec.md §5's "stores are exclusively owned by the local peer's role
/// engine").
pub(crate) struct ConsensusLoop {
	id: PeerId,
	peers: Vec<PeerId>,
	config: RaftConfig,

	state_store: PersistentState,
	log: PersistentLog,
	state_machine: StateMachine,
	rpc: Arc<Rpc>,

	commit_index: LogIndex,
	last_applied: LogIndex,

	role: Role,
	leader_tx: watch::Sender<Option<PeerId>>,

	event_tx: mpsc::Sender<Event>,
	rx: mpsc::Receiver<Event>,

	on_follower: Option<RoleListener>,
	on_candidate: Option<RoleListener>,
	on_leader: Option<RoleListener>,
}

pub(crate) struct ConsensusLoopArgs {
	pub id: PeerId,
	pub peers: Vec<PeerId>,
	pub config: RaftConfig,
	pub state_store: PersistentState,
	pub log: PersistentLog,
	pub state_machine: StateMachine,
	pub rpc: Arc<Rpc>,
	pub leader_tx: watch::Sender<Option<PeerId>>,
	pub event_tx: mpsc::Sender<Event>,
	pub rx: mpsc::Receiver<Event>,
	pub on_follower: Option<RoleListener>,
	pub on_candidate: Option<RoleListener>,
	pub on_leader: Option<RoleListener>,
}

impl ConsensusLoop {
	pub(crate) fn new(args: ConsensusLoopArgs) -> Self {
		// Placeholder role; `run()` immediately replaces it by entering
		// Follower for real (spec.md §4.5: "Initial role").
		let placeholder = Role::Follower(FollowerState {
			election_timer: Timer::new(Duration::from_secs(3600), || {}),
			leader_id: None,
		});
		ConsensusLoop {
			id: args.id,
			peers: args.peers,
			config: args.config,
			state_store: args.state_store,
			log: args.log,
			state_machine: args.state_machine,
			rpc: args.rpc,
			commit_index: 0,
			last_applied: 0,
			role: placeholder,
			leader_tx: args.leader_tx,
			event_tx: args.event_tx,
			rx: args.rx,
			on_follower: args.on_follower,
			on_candidate: args.on_candidate,
			on_leader: args.on_leader,
		}
	}

	fn cluster_size(&self) -> usize {
		self.peers.len() + 1
	}

	fn is_majority(&self, count: usize) -> bool {
		count > self.cluster_size() / 2
	}

	fn random_election_interval(&self) -> Duration {
		let (lo, hi) = self.config.election_interval_bounds();
		let lo_ms = lo.as_millis() as u64;
		let hi_ms = (hi.as_millis() as u64).max(lo_ms + 1);
		let ms = rand::thread_rng().gen_range(lo_ms..hi_ms);
		Duration::from_millis(ms)
	}

	fn notify(&self, role: RoleKind) {
		let listener = match role {
			RoleKind::Follower => &self.on_follower,
			RoleKind::Candidate => &self.on_candidate,
			RoleKind::Leader => &self.on_leader,
		};
		if let Some(f) = listener {
			let term = self.state_store.current_term().unwrap_or(0);
			f(RoleSnapshot {
				id: self.id.clone(),
				term,
				role,
			});
		}
	}

	fn stop_role_timers(&mut self) {
		match &mut self.role {
			Role::Follower(s) => s.election_timer.stop(),
			Role::Candidate(s) => s.election_timer.stop(),
			Role::Leader(s) => {
				s.heartbeat_timer.stop();
				s.step_down_timer.stop();
			}
		}
	}

	// ---- role entry ----------------------------------------------------

	/// Initial role, and re-entered from Candidate (election timeout) and
	/// Leader (step-down, or universal term rule demotion).
	///
	/// Does not reset `voted_for`: that field is only ever cleared when
	/// `current_term` advances (the universal term rule, or a Candidate's
	/// own election). Unconditionally clearing it here would defeat the
	/// restart guarantee that a vote persists for the remainder of its
	/// term — see DESIGN.md.
	fn enter_follower(&mut self) -> Result<()> {
		self.stop_role_timers();

		let interval = self.random_election_interval();
		let tx = self.event_tx.clone();
		let mut timer = Timer::new(interval, move || {
			let _ = tx.try_send(Event::ElectionTimeout);
		});
		timer.start();

		self.role = Role::Follower(FollowerState {
			election_timer: timer,
			leader_id: None,
		});
		let _ = self.leader_tx.send(None);
		self.notify(RoleKind::Follower);
		tracing::info!(peer = %self.id, "became follower");
		Ok(())
	}

	fn enter_candidate(&mut self) -> Result<()> {
		self.stop_role_timers();

		let new_term = self.state_store.current_term()? + 1;
		self.state_store.set_current_term(new_term)?;
		self.state_store.set_voted_for(&self.id)?;

		let interval = self.random_election_interval();
		let tx = self.event_tx.clone();
		let mut timer = Timer::new(interval, move || {
			let _ = tx.try_send(Event::ElectionTimeout);
		});
		timer.start();

		self.role = Role::Candidate(CandidateState {
			election_timer: timer,
			vote_count: 1, // self-vote
		});
		let _ = self.leader_tx.send(None);
		self.notify(RoleKind::Candidate);
		tracing::info!(peer = %self.id, term = new_term, "became candidate");

		let last_log_index = self.log.len()?;
		let last_log_term = self.log.last_log_term()?;
		let msg = Message::RequestVote(RequestVote {
			term: new_term,
			candidate_id: self.id.clone(),
			last_log_index,
			last_log_term,
		});
		let rpc = self.rpc.clone();
		let peers = self.peers.clone();
		tokio::spawn(async move { rpc.broadcast(&msg, &peers).await });
		Ok(())
	}

	fn enter_leader(&mut self) -> Result<()> {
		self.stop_role_timers();

		let last_log_index = self.log.len()?;
		let mut next_index = HashMap::new();
		let mut match_index = HashMap::new();
		for p in &self.peers {
			next_index.insert(p.clone(), last_log_index + 1);
			match_index.insert(p.clone(), 0);
		}

		let heartbeat_tx = self.event_tx.clone();
		let mut heartbeat_timer = Timer::new(self.config.heartbeat_interval, move || {
			let _ = heartbeat_tx.try_send(Event::HeartbeatTick);
		});
		let step_down_tx = self.event_tx.clone();
		let mut step_down_timer = Timer::new(self.config.step_down_interval(), move || {
			let _ = step_down_tx.try_send(Event::StepDownTimeout);
		});
		heartbeat_timer.start();
		step_down_timer.start();

		self.role = Role::Leader(LeaderState {
			heartbeat_timer,
			step_down_timer,
			next_index,
			match_index,
			response_set: HashMap::new(),
			pending_apply: HashMap::new(),
			request_id: 0,
		});
		let _ = self.leader_tx.send(Some(self.id.clone()));
		self.notify(RoleKind::Leader);
		tracing::info!(peer = %self.id, "became leader");
		Ok(())
	}

	// ---- role transitions (async: they may need to send over the wire) -

	async fn to_follower(&mut self) -> Result<()> {
		self.enter_follower()
	}

	async fn to_candidate(&mut self) -> Result<()> {
		self.enter_candidate()?;
		// Boundary behaviour (spec.md §8): for a single-node cluster, the
		// self-vote is already a strict majority, so there is no peer left
		// to wait on.
		let already_majority = matches!(&self.role, Role::Candidate(s) if self.is_majority(s.vote_count));
		if already_majority {
			self.to_leader().await?;
		}
		Ok(())
	}

	async fn to_leader(&mut self) -> Result<()> {
		self.enter_leader()?;
		self.heartbeat_tick().await
	}

	// ---- universal rules (spec.md §9 design note) -----------------------

	/// Applies the universal term rule (spec.md §4.5). Returns `false` if
	/// the message was stale and already fully handled (a rejection was
	/// sent, or the response was dropped) — the caller must not also run
	/// the type-specific handler in that case.
	async fn apply_universal_term_rule(&mut self, msg: &Message, sender: &PeerId) -> Result<bool> {
		let msg_term = msg.term();
		let current_term = self.state_store.current_term()?;

		if msg_term > current_term {
			self.state_store.set_current_term(msg_term)?;
			self.state_store.clear_voted_for()?;
			if !matches!(self.role, Role::Follower(_)) {
				self.to_follower().await?;
			}
			Ok(true)
		} else if msg_term < current_term {
			self.reply_stale(msg, sender, current_term).await?;
			Ok(false)
		} else {
			Ok(true)
		}
	}

	async fn reply_stale(&self, msg: &Message, sender: &PeerId, current_term: Term) -> Result<()> {
		match msg {
			Message::RequestVote(_) => {
				let resp = Message::RequestVoteResponse(RequestVoteResponse {
					term: current_term,
					vote_granted: false,
				});
				let _ = self.rpc.send(&resp, sender).await;
			}
			Message::AppendEntries(m) => {
				let resp = Message::AppendEntriesResponse(AppendEntriesResponse {
					term: current_term,
					success: false,
					last_log_index: self.log.len()?,
					last_log_term: self.log.last_log_term()?,
					request_id: m.request_id,
				});
				let _ = self.rpc.send(&resp, sender).await;
			}
			// "RequestVoteResponse messages with stale term are dropped"
			// (spec.md §4.5); the same applies by omission to a stale
			// AppendEntriesResponse — there is no response to a response.
			Message::RequestVoteResponse(_) | Message::AppendEntriesResponse(_) => {}
		}
		Ok(())
	}

	/// Universal commit/apply rule (spec.md §4.5). Safe to call
	/// unconditionally after any event, not just ones that can advance
	/// `commit_index` — it is a no-op when `commit_index == last_applied`.
	fn drive_commit_and_apply(&mut self) -> Result<()> {
		while self.commit_index > self.last_applied {
			self.last_applied += 1;
			let index = self.last_applied;
			if let Some(entry) = self.log.get(index)? {
				self.state_machine.apply(entry.command);
			}
			if let Role::Leader(s) = &mut self.role {
				if let Some(reply) = s.pending_apply.remove(&index) {
					let _ = reply.send(Ok(index));
				}
			}
		}
		Ok(())
	}

	// ---- inbound message dispatch ---------------------------------------

	async fn handle_inbound(&mut self, msg: Message, sender: PeerId) -> Result<()> {
		if !self.apply_universal_term_rule(&msg, &sender).await? {
			return Ok(());
		}

		match msg {
			Message::RequestVote(m) => self.handle_request_vote(m, sender).await?,
			Message::RequestVoteResponse(m) => self.handle_request_vote_response(m).await?,
			Message::AppendEntries(m) => self.handle_append_entries(m, sender).await?,
			Message::AppendEntriesResponse(m) => self.handle_append_entries_response(m, sender).await?,
		}

		self.drive_commit_and_apply()
	}

	/// Only the Follower role grants votes (spec.md §4.5 describes vote
	/// granting only under the Follower heading; Candidate/Leader keep the
	/// base no-response behaviour, matching `pyraft.state.BaseRole`'s
	/// abstract `on_receive_request_vote`).
	async fn handle_request_vote(&mut self, m: RequestVote, sender: PeerId) -> Result<()> {
		if !matches!(self.role, Role::Follower(_)) {
			return Ok(());
		}

		let current_term = self.state_store.current_term()?;
		let voted_for = self.state_store.voted_for()?;
		let our_last_log_term = self.log.last_log_term()?;
		let our_last_log_index = self.log.len()?;

		let not_yet_voted_elsewhere =
			voted_for.is_none() || voted_for.as_deref() == Some(m.candidate_id.as_str());
		let candidate_log_up_to_date = m.last_log_term > our_last_log_term
			|| (m.last_log_term == our_last_log_term && m.last_log_index >= our_last_log_index);
		let grant = not_yet_voted_elsewhere && candidate_log_up_to_date;

		if grant {
			self.state_store.set_voted_for(&m.candidate_id)?;
		}

		let resp = Message::RequestVoteResponse(RequestVoteResponse {
			term: current_term,
			vote_granted: grant,
		});
		let _ = self.rpc.send(&resp, &sender).await;
		Ok(())
	}

	/// Only the Candidate role acts on vote responses.
	async fn handle_request_vote_response(&mut self, m: RequestVoteResponse) -> Result<()> {
		if !matches!(self.role, Role::Candidate(_)) {
			return Ok(());
		}
		let current_term = self.state_store.current_term()?;
		if !m.vote_granted || m.term != current_term {
			return Ok(());
		}

		let became_leader = match &mut self.role {
			Role::Candidate(s) => {
				s.vote_count += 1;
				self.is_majority(s.vote_count)
			}
			_ => false,
		};
		if became_leader {
			self.to_leader().await?;
		}
		Ok(())
	}

	async fn handle_append_entries(&mut self, m: AppendEntries, sender: PeerId) -> Result<()> {
		match &self.role {
			Role::Follower(_) => self.apply_append_entries_as_follower(m, sender).await,
			Role::Candidate(_) => {
				let current_term = self.state_store.current_term()?;
				if m.term == current_term {
					// "acknowledge by transitioning to Follower ...; the
					// AppendEntries is then processed as by a Follower"
					// (spec.md §4.5, Candidate role).
					self.to_follower().await?;
					self.apply_append_entries_as_follower(m, sender).await
				} else {
					Ok(())
				}
			}
			// Not specified for Leader: by election safety (spec.md §8) a
			// current leader should never see an AppendEntries at its own
			// term from someone else.
			Role::Leader(_) => Ok(()),
		}
	}

	async fn apply_append_entries_as_follower(&mut self, m: AppendEntries, sender: PeerId) -> Result<()> {
		if let Role::Follower(s) = &mut self.role {
			s.leader_id = Some(m.leader_id.clone());
		}
		let _ = self.leader_tx.send(Some(m.leader_id.clone()));

		let current_term = self.state_store.current_term()?;
		let last_log_index = self.log.len()?;

		let consistent = last_log_index >= m.prev_log_index
			&& (m.prev_log_index == 0
				|| self.log.get(m.prev_log_index)?.map(|e| e.term) == Some(m.prev_log_term));

		if !consistent {
			let resp = Message::AppendEntriesResponse(AppendEntriesResponse {
				term: current_term,
				success: false,
				last_log_index,
				last_log_term: self.log.last_log_term()?,
				request_id: m.request_id,
			});
			let _ = self.rpc.send(&resp, &sender).await;
			return Ok(());
		}

		if last_log_index > m.prev_log_index {
			self.log.erase_suffix_from(m.prev_log_index)?;
		}
		self.log.append_many(m.entries)?;

		if m.leader_commit > self.commit_index {
			self.commit_index = m.leader_commit.min(self.log.len()?);
		}

		let resp = Message::AppendEntriesResponse(AppendEntriesResponse {
			term: current_term,
			success: true,
			last_log_index: self.log.len()?,
			last_log_term: self.log.last_log_term()?,
			request_id: m.request_id,
		});
		let _ = self.rpc.send(&resp, &sender).await;

		// "On valid AppendEntries (prefix accepted): reset election_timer."
		if let Role::Follower(s) = &mut self.role {
			s.election_timer.reset();
		}
		Ok(())
	}

	/// Only the Leader role acts on append-entries responses.
	async fn handle_append_entries_response(&mut self, m: AppendEntriesResponse, sender: PeerId) -> Result<()> {
		if !matches!(self.role, Role::Leader(_)) {
			return Ok(());
		}

		let became_majority = match &mut self.role {
			Role::Leader(s) => {
				let set = s.response_set.entry(m.request_id).or_default();
				set.insert(sender.clone());
				let count = set.len() + 1; // leader counts itself
				let is_majority = count > (self.peers.len() + 1) / 2;
				if is_majority {
					s.response_set.remove(&m.request_id);
				}
				is_majority
			}
			_ => false,
		};
		if became_majority {
			if let Role::Leader(s) = &mut self.role {
				s.step_down_timer.reset();
			}
		}

		if m.success {
			let leader_last_log_index = self.log.len()?;
			let should_update_commit = match &mut self.role {
				Role::Leader(s) => {
					let match_idx = *s.match_index.get(&sender).unwrap_or(&0);
					if m.last_log_index > match_idx {
						s.match_index.insert(sender.clone(), leader_last_log_index);
						s.next_index.insert(sender.clone(), leader_last_log_index + 1);
						true
					} else {
						false
					}
				}
				_ => false,
			};
			if should_update_commit {
				self.update_commit_index()?;
			}
		} else if let Role::Leader(s) = &mut self.role {
			let next_index = *s.next_index.get(&sender).unwrap_or(&1);
			let prev_index = next_index.saturating_sub(1);
			if m.last_log_index < prev_index {
				s.next_index.insert(sender.clone(), m.last_log_index + 1);
			} else {
				s.next_index.insert(sender.clone(), next_index.saturating_sub(1).max(1));
			}
		}

		let should_resend = {
			let last_log_index = self.log.len()?;
			match &self.role {
				Role::Leader(s) => last_log_index >= *s.next_index.get(&sender).unwrap_or(&1),
				_ => false,
			}
		};
		if should_resend {
			self.send_append_entries_to(&sender).await?;
		}
		Ok(())
	}

	/// Corrects a known source bug (`pyraft.state.Leader.update_commit_index`
	/// always counts exactly one matching peer regardless of `match_index`)
	/// by tallying a true majority over `match_index` (spec.md §4.5, §9).
	fn update_commit_index(&mut self) -> Result<()> {
		let current_term = self.state_store.current_term()?;
		let last_log_index = self.log.len()?;
		let mut committable = self.commit_index;

		if let Role::Leader(s) = &self.role {
			for index in (self.commit_index + 1)..=last_log_index {
				let mut count = 1; // leader counts itself
				for &m in s.match_index.values() {
					if m >= index {
						count += 1;
					}
				}
				let entry_term = self.log.get(index)?.map(|e| e.term).unwrap_or(0);
				if self.is_majority(count) && entry_term == current_term {
					committable = index;
				} else {
					break;
				}
			}
		}

		if committable > self.commit_index {
			self.commit_index = committable;
		}
		Ok(())
	}

	// ---- leader replication helpers -------------------------------------

	async fn send_append_entries_to(&mut self, peer: &PeerId) -> Result<()> {
		let current_term = self.state_store.current_term()?;
		let commit_index = self.commit_index;

		let (request_id, next_index) = match &self.role {
			Role::Leader(s) => (s.request_id, *s.next_index.get(peer).unwrap_or(&1)),
			_ => return Ok(()),
		};
		let prev_index = next_index.saturating_sub(1);
		let last_log_index = self.log.len()?;

		let entries = if last_log_index >= next_index {
			self.log.range(next_index, next_index + self.config.batch_max - 1)?
		} else {
			vec![]
		};
		let prev_log_term = if prev_index >= 1 {
			self.log.get(prev_index)?.map(|e| e.term).unwrap_or(0)
		} else {
			0
		};

		let msg = Message::AppendEntries(AppendEntries {
			term: current_term,
			leader_id: self.id.clone(),
			prev_log_index: prev_index,
			prev_log_term,
			entries,
			leader_commit: commit_index,
			request_id,
		});
		let rpc = self.rpc.clone();
		let peer = peer.clone();
		tokio::spawn(async move {
			let _ = rpc.send(&msg, &peer).await;
		});
		Ok(())
	}

	async fn send_append_entries_to_all(&mut self) -> Result<()> {
		let peers = self.peers.clone();
		for peer in peers {
			self.send_append_entries_to(&peer).await?;
		}
		Ok(())
	}

	async fn heartbeat_tick(&mut self) -> Result<()> {
		match &mut self.role {
			Role::Leader(s) => s.request_id += 1,
			_ => return Ok(()),
		};
		self.send_append_entries_to_all().await
	}

	async fn handle_election_timeout(&mut self) -> Result<()> {
		match &self.role {
			Role::Follower(_) => self.to_candidate().await,
			// "On election_timer fire: restart election — return to
			// Candidate with a fresh term; expressed as to_follower()
			// immediately followed by the usual Follower→Candidate path on
			// the next timeout" (spec.md §4.5, Candidate role).
			Role::Candidate(_) => self.to_follower().await,
			Role::Leader(_) => Ok(()), // stray fire from an already-replaced timer
		}
	}

	async fn handle_step_down_timeout(&mut self) -> Result<()> {
		if matches!(self.role, Role::Leader(_)) {
			self.to_follower().await?;
		}
		Ok(())
	}

	/// Dropping the pending reply (rather than leaving it permanently
	/// unresolved) when this peer is not the leader or when it steps down
	/// before the entry commits is the noted Rust-idiomatic deviation from
	/// the asyncio original — see DESIGN.md.
	async fn handle_execute(&mut self, command: Command, reply: ApplyReply) -> Result<()> {
		if !matches!(self.role, Role::Leader(_)) {
			let hint = match &self.role {
				Role::Follower(s) => s.leader_id.clone(),
				_ => None,
			};
			let _ = reply.send(Err(ErrorKind::NotLeader(hint).into()));
			return Ok(());
		}

		let current_term = self.state_store.current_term()?;
		let index = self.log.append(LogEntry {
			term: current_term,
			command,
		})?;

		if let Role::Leader(s) = &mut self.role {
			s.pending_apply.insert(index, reply);
			s.heartbeat_timer.reset();
		}
		self.send_append_entries_to_all().await?;

		// Boundary behaviour (spec.md §8): for a single-node cluster the
		// leader's own log position already satisfies a majority, and there
		// is no `AppendEntriesResponse` coming back to trigger this via
		// `handle_append_entries_response`. Checking here too means a
		// commit never depends on a peer that doesn't exist.
		self.update_commit_index()?;
		self.drive_commit_and_apply()
	}

	fn handle_get_value(&self, key: String, reply: oneshot::Sender<Option<serde_json::Value>>) {
		let _ = reply.send(self.state_machine.get(&key));
	}

	/// Drains events in arrival order until the channel closes. A
	/// `PersistenceError` is fatal per spec.md §7: the peer treats it as a
	/// crash rather than silently acknowledging whatever triggered it.
	pub(crate) async fn run(mut self) {
		if let Err(e) = self.enter_follower() {
			tracing::error!("failed to start as follower: {}", e);
			std::process::exit(1);
		}

		while let Some(event) = self.rx.recv().await {
			let result = match event {
				Event::Inbound(msg, sender) => self.handle_inbound(msg, sender).await,
				Event::ElectionTimeout => self.handle_election_timeout().await,
				Event::HeartbeatTick => self.heartbeat_tick().await,
				Event::StepDownTimeout => self.handle_step_down_timeout().await,
				Event::Execute(command, reply) => self.handle_execute(command, reply).await,
				Event::GetValue(key, reply) => {
					self.handle_get_value(key, reply);
					Ok(())
				}
			};
			if let Err(e) = result {
				tracing::error!("persistence error, treating as fatal: {}", e);
				std::process::exit(1);
			}
		}
	}
}
