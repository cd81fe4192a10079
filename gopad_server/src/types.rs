use prototk_derive::Message;

use gopad_document::{ClientId, Op};

/// `view_seqs[i]` records which consensus slot produced the ops that advanced the log to
/// `view`; log GC walks this list to decide which slots are safe to mark `done`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Message)]
pub struct ViewSeqEntry {
    #[prototk(1, uint32)]
    pub view: u32,
    #[prototk(2, int64)]
    pub seq: i64,
}

/// The highest view number each client has acknowledged, either by producing an op that carries
/// it or by pulling via `Query`. The minimum across all entries is the log-GC watermark.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Message)]
pub struct UserViewEntry {
    #[prototk(1, int32)]
    pub client: ClientId,
    #[prototk(2, uint32)]
    pub view: u32,
}

/// Everything about a [crate::Server] other than the document and the consensus core, shipped
/// as the `srv` half of a `Copy` reply. Grounded on `server.go`'s `Server` struct fields that
/// survive a restart.
#[derive(Clone, Debug, Default, Message)]
pub struct ServerSnapshot {
    #[prototk(1, message)]
    pub commit_log: Vec<Op>,
    #[prototk(2, uint32)]
    pub discard_point: u32,
    #[prototk(3, message)]
    pub user_views: Vec<UserViewEntry>,
    #[prototk(4, message)]
    pub view_seqs: Vec<ViewSeqEntry>,
    #[prototk(5, int64)]
    pub start_seq: i64,
    #[prototk(6, int64)]
    pub query_seq: i64,
}
