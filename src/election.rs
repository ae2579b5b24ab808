use std::time::Duration;

use log::{debug, info};

use crate::message::{Message, BROADCAST};
use crate::replica::{Replica, Role};
use crate::transport::Transport;

impl Replica {
    /// Starts an election: becomes Candidate, votes for self, bumps the
    /// term, and broadcasts a `requestVote` (§4.D).
    pub(crate) fn start_election(&mut self, transport: &dyn Transport) {
        self.role = Role::Candidate;
        self.current_leader = BROADCAST.to_string();
        self.supporters.clear();
        self.supporters.insert(self.my_id.clone());
        self.current_term += 1;
        info!("{}: starting election for term {}", self.my_id, self.current_term);

        let last = self.log.last_index();
        let last_term = self.log.term_at(last);
        self.send_message(
            transport,
            Message::RequestVote {
                src: self.my_id.clone(),
                dst: BROADCAST.to_string(),
                leader: self.current_leader.clone(),
                term: self.current_term,
                candidate_id: self.my_id.clone(),
                last_log_index: last,
                last_log_term: last_term,
            },
        );
    }

    /// Implements the decision table in §4.D. Reject/grant is determined
    /// first; only the final "otherwise" clause performs a full
    /// `reset_to_follower` (clearing term/leader/candidate state) — the two
    /// earlier grant clauses only update `voted_for_term` and step down to
    /// Follower, matching the specification's note that `current_leader` is
    /// only set via `reset_to_follower` on the last clause.
    pub(crate) fn handle_request_vote(
        &mut self,
        transport: &dyn Transport,
        src: String,
        term: u64,
        _candidate_id: String,
        last_log_index: u64,
        last_log_term: u64,
    ) {
        let my_last = self.log.last_index();
        let my_last_term = self.log.term_at(my_last);

        let grant = if term <= self.voted_for_term {
            false
        } else if last_log_term < my_last_term {
            false
        } else if last_log_term > my_last_term {
            self.voted_for_term = term;
            self.role = Role::Follower;
            true
        } else if last_log_index < my_last {
            false
        } else if last_log_index > my_last {
            self.voted_for_term = term;
            self.role = Role::Follower;
            true
        } else if self.role == Role::Candidate && self.current_term == term {
            false
        } else if self.current_term >= term {
            false
        } else {
            self.voted_for_term = term;
            self.reset_to_follower(BROADCAST, term);
            true
        };

        debug!(
            "{}: requestVote from {} (term {}) -> granted={}",
            self.my_id, src, term, grant
        );

        self.send_message(
            transport,
            Message::Vote {
                src: self.my_id.clone(),
                dst: src,
                leader: self.current_leader.clone(),
                term: self.current_term,
                last_log_index: my_last,
                last_log_term: my_last_term,
                vote_granted: grant,
            },
        );
    }

    /// Ignored outside the Candidate role. A granted vote is tallied; a
    /// rejection from a peer whose log is identical to ours is treated as a
    /// split vote between equals and we keep waiting; any other rejection
    /// means someone is ahead of us and we withdraw (§4.D).
    pub(crate) fn handle_vote(
        &mut self,
        _transport: &dyn Transport,
        src: String,
        term: u64,
        last_log_index: u64,
        last_log_term: u64,
        vote_granted: bool,
    ) {
        if self.role != Role::Candidate {
            return;
        }

        if vote_granted {
            self.supporters.insert(src);
            return;
        }

        let my_last = self.log.last_index();
        let my_last_term = self.log.term_at(my_last);
        let identical_logs = last_log_index == my_last && last_log_term == my_last_term;
        if identical_logs && term == self.current_term {
            debug!("{}: split vote against equal peer {}, waiting", self.my_id, src);
            return;
        }

        info!("{}: withdrawing candidacy for term {}", self.my_id, self.current_term);
        self.role = Role::Follower;
        self.current_term -= 1;
        self.election_timeout += Duration::from_secs(2);
    }

    /// Transitions Candidate -> Leader on reaching quorum: emits one
    /// heartbeat immediately, then initializes per-peer replication cursors
    /// and clears the read queue (§4.D, §4.E).
    pub(crate) fn become_leader(&mut self, transport: &dyn Transport) {
        self.role = Role::Leader;
        self.current_leader = self.my_id.clone();
        self.next_index.clear();
        self.match_index.clear();
        for peer in &self.peer_ids {
            self.next_index.insert(peer.clone(), self.log.len());
            self.match_index.insert(peer.clone(), 0);
        }
        self.get_queue.clear();
        info!("{}: elected leader for term {}", self.my_id, self.current_term);
        self.broadcast_heartbeat(transport);
    }
}

#[cfg(test)]
mod tests {
    use crate::raft_log::Log;
    use crate::message::Message;
    use crate::replica::Replica;
    use crate::replica::Role;
    use crate::transport::tests::RecordingTransport;

    fn replica() -> Replica {
        Replica::new("A".into(), vec!["B".into(), "C".into()])
    }

    #[test]
    fn start_election_increments_term_and_votes_for_self() {
        let mut r = replica();
        let t = RecordingTransport::new();
        r.start_election(&t);
        assert_eq!(r.role, Role::Candidate);
        assert_eq!(r.current_term, 1);
        assert!(r.supporters.contains("A"));
        let sent = t.sent_one();
        assert!(matches!(sent, Message::RequestVote { term: 1, .. }));
    }

    #[test]
    fn grants_vote_to_peer_with_longer_log() {
        let mut r = replica();
        r.log = {
            let mut l = Log::new();
            l.append(crate::message::Entry {
                term: 1,
                key: "x".into(),
                value: "1".into(),
                client_id: "c".into(),
                request_id: "r".into(),
            });
            l
        };
        let t = RecordingTransport::new();
        r.handle_request_vote(&t, "B".into(), 1, "B".into(), 5, 2);
        match t.sent_one() {
            Message::Vote { vote_granted, .. } => assert!(vote_granted),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn rejects_vote_for_shorter_log() {
        let mut r = replica();
        r.current_term = 1;
        let t = RecordingTransport::new();
        // candidate's lastLogTerm(0) is behind our sentinel term(1)
        r.handle_request_vote(&t, "B".into(), 2, "B".into(), 0, 0);
        match t.sent_one() {
            Message::Vote { vote_granted, .. } => assert!(!vote_granted),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn withdraws_on_rejection_from_ahead_peer() {
        let mut r = replica();
        let t = RecordingTransport::new();
        r.start_election(&t);
        assert_eq!(r.current_term, 1);
        r.handle_vote(&t, "B".into(), 1, 5, 5, false);
        assert_eq!(r.role, Role::Follower);
        assert_eq!(r.current_term, 0);
    }

    #[test]
    fn becomes_leader_on_quorum() {
        let mut r = replica();
        let t = RecordingTransport::new();
        r.start_election(&t);
        r.handle_vote(&t, "B".into(), 1, 0, 1, true);
        assert!(r.is_quorum(r.supporters.len()));
        r.become_leader(&t);
        assert_eq!(r.role, Role::Leader);
        assert_eq!(r.current_leader, "A");
        assert_eq!(*r.next_index.get("B").unwrap(), r.log.len());
    }
}
