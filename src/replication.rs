use std::time::Instant;

use log::debug;

use crate::message::{Message, BROADCAST};
use crate::replica::{Replica, Role};
use crate::transport::Transport;

/// Above this many entries behind, a dispatch is capped to 50 entries per
/// round so one very-stale peer can't monopolize a single `appendEntry`
/// (§4.E).
const CATCH_UP_CHUNK: u64 = 50;
const CATCH_UP_THRESHOLD: u64 = 100;

impl Replica {
    /// For each peer, sends whatever the leader believes that peer still
    /// needs (possibly nothing, i.e. a heartbeat) and optimistically
    /// advances `next_index`; a later `confirmation` corrects any mismatch
    /// (§4.E). Doubles as the periodic heartbeat: a fully caught-up peer
    /// simply receives an empty-entries `appendEntry`, which is enough to
    /// suppress its election timer.
    pub(crate) fn dispatch_append_entries(&mut self, transport: &dyn Transport) {
        if self.role != Role::Leader {
            return;
        }

        let peers = self.peer_ids.clone();
        for peer in peers {
            let next_to_send = *self.next_index.get(&peer).unwrap_or(&self.log.len());
            let prev_log_index = next_to_send.saturating_sub(1);
            let prev_log_term = self.log.term_at(prev_log_index);

            let remaining = self.log.len().saturating_sub(next_to_send);
            let end = if remaining > CATCH_UP_THRESHOLD {
                next_to_send + CATCH_UP_CHUNK
            } else {
                self.log.len()
            };
            let entries = self.log.slice(next_to_send, end);
            let sent = entries.len() as u64;

            self.send_message(
                transport,
                Message::AppendEntry {
                    src: self.my_id.clone(),
                    dst: peer.clone(),
                    leader: self.current_leader.clone(),
                    term: self.current_term,
                    prev_log_index,
                    prev_log_term,
                    leader_commit: self.commit_index,
                    leader_last_applied: self.last_applied,
                    entries,
                },
            );
            self.next_index.insert(peer, next_to_send + sent);
        }
        self.last_heartbeat = Instant::now();
    }

    /// The single broadcast heartbeat sent immediately upon winning an
    /// election (§4.D "Winning"). Subsequent timeout suppression happens
    /// through the per-peer dispatch above.
    pub(crate) fn broadcast_heartbeat(&mut self, transport: &dyn Transport) {
        let last = self.log.last_index();
        let last_term = self.log.term_at(last);
        self.send_message(
            transport,
            Message::AppendEntry {
                src: self.my_id.clone(),
                dst: BROADCAST.to_string(),
                leader: self.current_leader.clone(),
                term: self.current_term,
                prev_log_index: last,
                prev_log_term: last_term,
                leader_commit: self.commit_index,
                leader_last_applied: self.last_applied,
                entries: vec![],
            },
        );
        self.last_heartbeat = Instant::now();
    }

    /// Follower-side handling of `appendEntry` (§4.E). A heartbeat (empty
    /// `entries`) only ever resets role/term bookkeeping; a real append
    /// either splices in on a matching `(prevLogIndex, prevLogTerm)` or
    /// reports the mismatch so the leader can rewind `next_index`.
    pub(crate) fn handle_append_entry(
        &mut self,
        transport: &dyn Transport,
        src: String,
        leader: String,
        term: u64,
        prev_log_index: u64,
        prev_log_term: u64,
        leader_commit: u64,
        entries: Vec<crate::message::Entry>,
    ) {
        if entries.is_empty() {
            if self.current_term <= term {
                self.reset_to_follower(&leader, term);
            }
            return;
        }

        let follower_pli = self.log.last_index().min(prev_log_index);
        let follower_plt = self.log.term_at(follower_pli);

        if self.current_term <= term {
            self.reset_to_follower(&leader, term);
        }

        if follower_pli == prev_log_index && follower_plt == prev_log_term {
            self.log.truncate_and_extend(follower_pli + 1, entries);
            let new_last = self.log.last_index();
            let new_last_term = self.log.term_at(new_last);
            self.send_message(
                transport,
                Message::Confirmation {
                    src: self.my_id.clone(),
                    dst: src,
                    leader: self.current_leader.clone(),
                    term: self.current_term,
                    success: true,
                    follower_prev_last_index: new_last,
                    follower_prev_last_term: new_last_term,
                },
            );
            self.commit_index = leader_commit;
            if self.last_applied < self.commit_index {
                self.last_applied += 1;
                let entry = self.log.entry_at(self.last_applied).clone();
                debug!(
                    "{}: applying entry {} ({}={}) from leader {}",
                    self.my_id, self.last_applied, entry.key, entry.value, leader
                );
                self.state_machine.apply(&entry);
            }
        } else {
            self.send_message(
                transport,
                Message::Confirmation {
                    src: self.my_id.clone(),
                    dst: src,
                    leader: self.current_leader.clone(),
                    term: self.current_term,
                    success: false,
                    follower_prev_last_index: follower_pli,
                    follower_prev_last_term: follower_plt,
                },
            );
        }
    }

    /// Leader-side handling of `confirmation` (§4.E). A stale confirmation
    /// (lower term than ours, or arriving while we're no longer leader) is
    /// ignored. A success advances `match_index` and re-runs the commit
    /// rule; a failure rewinds `next_index` for a later retry.
    pub(crate) fn handle_confirmation(
        &mut self,
        transport: &dyn Transport,
        src: String,
        leader: String,
        term: u64,
        success: bool,
        follower_prev_last_index: u64,
        follower_prev_last_term: u64,
    ) {
        if self.current_term < term {
            self.reset_to_follower(&leader, term);
            return;
        }
        if self.role != Role::Leader {
            return;
        }

        if success {
            self.match_index.insert(src, follower_prev_last_index);
            self.advance_commit_index();
            self.apply_committed(transport);
            self.dispatch_append_entries(transport);
            return;
        }

        let fpli = follower_prev_last_index;
        let fplt = follower_prev_last_term;
        let matched_so_far = *self.match_index.get(&src).unwrap_or(&0);
        if self.log.term_at(fpli) == fplt && matched_so_far <= fpli {
            self.next_index.insert(src.clone(), (fpli + 1).max(1));
            self.match_index.insert(src, fpli);
        } else {
            self.next_index.insert(src, fpli.max(1));
        }
    }

    /// Scans forward from `commit_index + 1` counting replicas with
    /// `match_index >= candidate`, per the current-term-only commit rule
    /// (§4.E, §8 invariant 4 — Leader Completeness is what this rule
    /// protects).
    fn advance_commit_index(&mut self) {
        let mut candidate = self.commit_index + 1;
        while candidate < self.log.len() {
            let term = self.log.term_at(candidate);
            if term < self.current_term {
                candidate += 1;
                continue;
            }
            if term != self.current_term {
                break;
            }
            let replicated = self
                .match_index
                .values()
                .filter(|&&idx| idx >= candidate)
                .count()
                + 1; // the leader itself always has this entry
            if self.is_quorum(replicated) {
                self.commit_index = candidate;
                debug!("{}: commit index advanced to {}", self.my_id, candidate);
                candidate += 1;
            } else {
                break;
            }
        }
    }

    /// Applies everything newly committed and acknowledges each entry's
    /// origin client (§4.E step 3).
    fn apply_committed(&mut self, transport: &dyn Transport) {
        while self.last_applied < self.commit_index {
            self.last_applied += 1;
            let entry = self.log.entry_at(self.last_applied).clone();
            debug!(
                "{}: applying entry {} ({}={}) for client {}",
                self.my_id, self.last_applied, entry.key, entry.value, entry.client_id
            );
            self.state_machine.apply(&entry);
            self.send_message(
                transport,
                Message::Ok {
                    src: self.my_id.clone(),
                    dst: entry.client_id,
                    leader: self.current_leader.clone(),
                    mid: entry.request_id,
                    value: None,
                },
            );
        }
    }
}
