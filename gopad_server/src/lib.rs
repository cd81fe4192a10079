#![doc = r#"
gopad_server is the replication server: it accepts client RPCs (`Init`, `Handle`, `Query`,
`Copy`), drives batches of document ops through [gopad_paxos] consensus, folds decided batches
into a canonical [gopad_document::Doc], and serves committed log tails back to clients for
rebase. Grounded on `examples/original_source/src/server.go`.
"#]

mod error;
mod server;
mod types;
mod wire;

pub use error::Error;
pub use server::{register_biometrics, server_client, Server, UPDATE_DELAY};
pub use types::{ServerSnapshot, UserViewEntry, ViewSeqEntry};
pub use wire::{
    CopyReply, CopyRequest, HandleReply, HandleRequest, InitReply, InitRequest, QueryReply,
    QueryRequest, ServerClient, ServerServer, ServerService,
};
