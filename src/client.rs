use crate::message::{Message, BROADCAST};
use crate::replica::{QueuedGet, Replica, Role};
use crate::transport::Transport;

impl Replica {
    /// Handles a client `get` (§4.F). A non-leader redirects. A leader with
    /// nothing uncommitted answers immediately (after first draining
    /// anything already queued); otherwise the read is queued until the log
    /// catches up to the point it was received at, preserving linearizable
    /// semantics across a read that started before some outstanding write
    /// committed.
    pub(crate) fn handle_get(&mut self, transport: &dyn Transport, src: String, mid: String, key: String) {
        if self.role != Role::Leader {
            self.redirect(transport, src, mid);
            return;
        }

        if self.commit_index < self.log.last_index() {
            self.get_queue.push(QueuedGet {
                src,
                mid,
                key,
                index_received_at: self.log.last_index(),
            });
            return;
        }

        self.drain_get_queue(transport);
        let value = self.state_machine.lookup(&key);
        self.send_message(
            transport,
            Message::Ok {
                src: self.my_id.clone(),
                dst: src,
                leader: self.current_leader.clone(),
                mid,
                value: Some(value),
            },
        );
    }

    /// Handles a client `put` (§4.F). A non-leader redirects; a leader
    /// appends the write to its own log and kicks off replication. The
    /// client only hears back once the entry commits, via the `ok` sent from
    /// `apply_committed` in `replication.rs`.
    pub(crate) fn handle_put(
        &mut self,
        transport: &dyn Transport,
        src: String,
        mid: String,
        key: String,
        value: String,
    ) {
        if self.role != Role::Leader {
            self.redirect(transport, src, mid);
            return;
        }

        self.log.append(crate::message::Entry {
            term: self.current_term,
            key,
            value,
            client_id: src,
            request_id: mid,
        });
        self.dispatch_append_entries(transport);
    }

    fn redirect(&self, transport: &dyn Transport, src: String, mid: String) {
        let leader = if self.current_leader == BROADCAST {
            self.my_id.clone()
        } else {
            self.current_leader.clone()
        };
        self.send_message(
            transport,
            Message::Redirect {
                src: self.my_id.clone(),
                dst: src,
                leader,
                mid,
            },
        );
    }

    /// Answers every queued read whose `index_received_at` has since
    /// committed, in FIFO order, leaving anything still waiting in place
    /// (§4.F, §4.G step 8).
    pub(crate) fn drain_get_queue(&mut self, transport: &dyn Transport) {
        let commit_index = self.commit_index;
        let mut i = 0;
        while i < self.get_queue.len() {
            if self.get_queue[i].index_received_at <= commit_index {
                let queued = self.get_queue.remove(i);
                let value = self.state_machine.lookup(&queued.key);
                self.send_message(
                    transport,
                    Message::Ok {
                        src: self.my_id.clone(),
                        dst: queued.src,
                        leader: self.current_leader.clone(),
                        mid: queued.mid,
                        value: Some(value),
                    },
                );
            } else {
                i += 1;
            }
        }
    }
}
