use gopad_document::Batch;
use prototk_derive::Message;
use rpc_pb::service;

use crate::Error;

////////////////////////////////////////////// Prepare //////////////////////////////////////////////

/// Phase 1: a proposer asks acceptors to promise not to accept any ballot lower than `n`.
#[derive(Clone, Debug, Default, Message)]
pub struct PrepareRequest {
    #[prototk(1, int64)]
    pub slot: i64,
    #[prototk(2, int64)]
    pub n: i64,
}

#[derive(Clone, Debug, Default, Message)]
pub struct PrepareReply {
    #[prototk(1, Bool)]
    pub ok: bool,
    /// The highest-numbered proposal this acceptor has already accepted for the slot, if any.
    #[prototk(2, int64)]
    pub n_a: i64,
    #[prototk(3, message)]
    pub value: Option<Batch>,
    /// The highest proposal number seen, returned on rejection so the proposer can pick a
    /// higher one immediately instead of guessing.
    #[prototk(4, int64)]
    pub hi: i64,
}

////////////////////////////////////////////// Accept ///////////////////////////////////////////////

/// Phase 2: a proposer asks acceptors to accept `value` under ballot `n`.
#[derive(Clone, Debug, Default, Message)]
pub struct AcceptRequest {
    #[prototk(1, int64)]
    pub slot: i64,
    #[prototk(2, int64)]
    pub n: i64,
    #[prototk(3, message)]
    pub value: Batch,
}

#[derive(Clone, Debug, Default, Message)]
pub struct AcceptReply {
    #[prototk(1, Bool)]
    pub ok: bool,
    #[prototk(2, int64)]
    pub hi: i64,
}

////////////////////////////////////////////// Decided ///////////////////////////////////////////////

/// A learner notification: the slot has decided `value`. Idempotent; acceptors apply this even
/// without having seen Phase 1/2 for the slot (state transfer / lagging replica catch-up).
#[derive(Clone, Debug, Default, Message)]
pub struct DecidedRequest {
    #[prototk(1, int64)]
    pub slot: i64,
    #[prototk(2, message)]
    pub value: Batch,
}

#[derive(Clone, Debug, Default, Message)]
pub struct DecidedReply {
    #[prototk(1, Bool)]
    pub ok: bool,
}

//////////////////////////////////////////// ReplyDone ///////////////////////////////////////////////

/// Gossip of `done_seq`: the highest slot this replica has applied to its document and no longer
/// needs retained. Used to compute the garbage-collection watermark across the group.
#[derive(Clone, Debug, Default, Message)]
pub struct ReplyDoneRequest {
    #[prototk(1, uint64)]
    pub me: u64,
    #[prototk(2, int64)]
    pub done: i64,
}

#[derive(Clone, Debug, Default, Message)]
pub struct ReplyDoneReply {
    #[prototk(1, int64)]
    pub done: i64,
}

///////////////////////////////////////////// PaxosService ///////////////////////////////////////////

service! {
    name = PaxosService;
    server = PaxosServer;
    client = PaxosClient;
    error = Error;

    rpc prepare(PrepareRequest) -> PrepareReply;
    rpc accept(AcceptRequest) -> AcceptReply;
    rpc decided(DecidedRequest) -> DecidedReply;
    rpc reply_done(ReplyDoneRequest) -> ReplyDoneReply;
}
