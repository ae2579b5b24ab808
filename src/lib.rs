//! A replicated key-value store coordinated by a Raft-family consensus
//! engine, driven from a single blocking-receive event loop.

mod client;
mod election;
mod raft_log;
mod replica;
mod replication;
mod state_machine;

pub mod error;
pub mod message;
pub mod transport;

pub use error::{Error, Result};
pub use message::{Entry, Message, BROADCAST};
pub use replica::{QueuedGet, Replica, Role, IDLE_GET_QUEUE_DRAIN};
pub use state_machine::StateMachine;
pub use transport::{SeqpacketTransport, Transport};
