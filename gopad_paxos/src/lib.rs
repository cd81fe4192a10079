#![doc = r#"
gopad_paxos implements single-decree Multi-Paxos consensus over an indefinite sequence of
slots, each slot's decree a [gopad_document::Batch] of ops. It has no reference to the
replication server or to the document engine beyond the `Batch` value type: callers drive the
log forward with `start`, observe it with `status`/`max`/`min`, and reclaim memory with `done`.
"#]

mod error;
mod paxos;
mod types;
mod wire;

pub use error::Error;
pub use paxos::{register_biometrics, Paxos};
pub use types::{Fate, PaxosSnapshot, SlotSnapshot, SlotState};
pub use wire::{
    AcceptReply, AcceptRequest, DecidedReply, DecidedRequest, PaxosClient, PaxosServer,
    PaxosService, PrepareReply, PrepareRequest, ReplyDoneReply, ReplyDoneRequest,
};
