use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use log::info;
use rand::Rng;

use crate::raft_log::Log;
use crate::message::{Message, BROADCAST};
use crate::state_machine::StateMachine;
use crate::transport::Transport;

/// The three roles a replica can be in (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// A linearizable `get` deferred because the log had uncommitted entries at
/// intake time (§4.F).
pub struct QueuedGet {
    pub src: String,
    pub mid: String,
    pub key: String,
    pub index_received_at: u64,
}

/// A leader drains a quiet read queue at least this often, so a client
/// isn't stuck behind a leader that has nothing left to replicate (§4.G
/// step 8).
pub const IDLE_GET_QUEUE_DRAIN: Duration = Duration::from_secs(2);

/// The in-memory state of one cluster member, per §3. Every mutation to this
/// struct happens through the election (`election.rs`), replication
/// (`replication.rs`), or client (`client.rs`) handlers; the log and state
/// machine are never touched directly from the event loop.
pub struct Replica {
    pub my_id: String,
    pub peer_ids: Vec<String>,

    pub current_term: u64,
    pub voted_for_term: u64,
    pub current_leader: String,
    pub role: Role,
    pub supporters: BTreeSet<String>,

    pub log: Log,
    pub state_machine: StateMachine,
    pub commit_index: u64,
    pub last_applied: u64,

    pub next_index: BTreeMap<String, u64>,
    pub match_index: BTreeMap<String, u64>,

    pub get_queue: Vec<QueuedGet>,

    pub election_timeout: Duration,
    pub last_event: Instant,
    pub(crate) last_heartbeat: Instant,
}

impl Replica {
    pub fn new(my_id: String, peer_ids: Vec<String>) -> Replica {
        let election_timeout = random_election_timeout();
        let now = Instant::now();
        Replica {
            my_id,
            peer_ids,
            current_term: 0,
            voted_for_term: 0,
            current_leader: BROADCAST.to_string(),
            role: Role::Follower,
            supporters: BTreeSet::new(),
            log: Log::new(),
            state_machine: StateMachine::new(),
            commit_index: 0,
            last_applied: 0,
            next_index: BTreeMap::new(),
            match_index: BTreeMap::new(),
            get_queue: Vec::new(),
            election_timeout,
            last_event: now,
            last_heartbeat: now,
        }
    }

    /// Strict majority of the cluster, the leader included (§9: the
    /// specification's adopted resolution of the integer-division quorum
    /// ambiguity).
    pub fn cluster_size(&self) -> usize {
        self.peer_ids.len() + 1
    }

    pub fn is_quorum(&self, count: usize) -> bool {
        count > self.cluster_size() / 2
    }

    fn election_timed_out(&self) -> bool {
        self.role != Role::Leader && self.last_event.elapsed() > self.election_timeout
    }

    pub(crate) fn send_message(&self, transport: &dyn Transport, message: Message) {
        if let Err(e) = transport.send(&message.encode()) {
            log::warn!("{}: transport send failed: {}", self.my_id, e);
        }
    }

    /// The event loop (§4.G). Runs until the process is killed.
    pub fn run(&mut self, transport: &mut dyn Transport) -> ! {
        loop {
            // Step 1: candidate with quorum becomes leader.
            if self.role == Role::Candidate && self.is_quorum(self.supporters.len()) {
                self.become_leader(&*transport);
            }

            // Step 2-3: wait for a message up to election_timeout.
            let message = match transport.recv(self.election_timeout) {
                Ok(Some(bytes)) => match Message::decode(&bytes) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        log::warn!("{}: dropping bad message: {}", self.my_id, e);
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    log::warn!("{}: transport recv failed: {}", self.my_id, e);
                    None
                }
            };

            // Step 4: reset last_event for timer-relevant kinds.
            if let Some(ref m) = message {
                if m.resets_election_timer() {
                    self.last_event = Instant::now();
                }
            }

            // Step 5: start an election if we've timed out and aren't leader.
            if self.election_timed_out() {
                self.start_election(&*transport);
                self.last_event = Instant::now();
            }

            // Step 6: dispatch.
            if let Some(message) = message {
                self.dispatch(&*transport, message);
            }

            // Step 7 (mirrors step 4): a message that reset the timer stays
            // reset regardless of what dispatch did with it.
            // (Nothing further to do: dispatch never changes `last_event`
            // itself, so step 4's update already holds.)

            // Step 8: a quiet leader re-dispatches (which also serves as its
            // heartbeat) and drains its read queue, so neither followers nor
            // blocked readers wait indefinitely behind an otherwise-idle
            // leader.
            if self.role == Role::Leader && self.last_heartbeat.elapsed() > IDLE_GET_QUEUE_DRAIN {
                self.dispatch_append_entries(&*transport);
                self.drain_get_queue(&*transport);
            }
        }
    }

    fn dispatch(&mut self, transport: &dyn Transport, message: Message) {
        match message {
            Message::Get { src, mid, key, .. } => self.handle_get(transport, src, mid, key),
            Message::Put {
                src,
                mid,
                key,
                value,
                ..
            } => self.handle_put(transport, src, mid, key, value),
            Message::RequestVote {
                src,
                term,
                candidate_id,
                last_log_index,
                last_log_term,
                ..
            } => self.handle_request_vote(
                transport,
                src,
                term,
                candidate_id,
                last_log_index,
                last_log_term,
            ),
            Message::Vote {
                src,
                term,
                last_log_index,
                last_log_term,
                vote_granted,
                ..
            } => self.handle_vote(
                transport,
                src,
                term,
                last_log_index,
                last_log_term,
                vote_granted,
            ),
            Message::AppendEntry {
                src,
                leader,
                term,
                prev_log_index,
                prev_log_term,
                leader_commit,
                entries,
                ..
            } => self.handle_append_entry(
                transport,
                src,
                leader,
                term,
                prev_log_index,
                prev_log_term,
                leader_commit,
                entries,
            ),
            Message::Confirmation {
                src,
                leader,
                term,
                success,
                follower_prev_last_index,
                follower_prev_last_term,
                ..
            } => self.handle_confirmation(
                transport,
                src,
                leader,
                term,
                success,
                follower_prev_last_index,
                follower_prev_last_term,
            ),
            // A reply to a client request should never arrive as an inbound
            // message to a replica; this would mean a confused peer echoed
            // one back. Treated as a StaleMessage and dropped.
            Message::Redirect { .. } | Message::Ok { .. } => {}
        }
    }

    /// Resets to `Follower` under `new_leader`/`new_term`, clearing every
    /// piece of state that's only meaningful while Candidate or Leader
    /// (§4.D). The read queue is deliberately preserved; see §9.
    pub(crate) fn reset_to_follower(&mut self, new_leader: &str, new_term: u64) {
        if self.role != Role::Follower {
            info!("{}: stepping down to follower (term {})", self.my_id, new_term);
        }
        self.role = Role::Follower;
        self.supporters.clear();
        self.next_index.clear();
        self.match_index.clear();
        self.current_term = new_term;
        self.current_leader = new_leader.to_string();
    }
}

fn random_election_timeout() -> Duration {
    let millis = rand::thread_rng().gen_range(500..=3000);
    Duration::from_millis(millis)
}
