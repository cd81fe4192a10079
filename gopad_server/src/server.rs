use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use biometrics::Counter;
use buffertk::{stack_pack, Unpackable};
use gopad_document::{Batch, ClientId, Doc, Op, OpKind, SessionId};
use gopad_paxos::Paxos;
use indicio::{clue, INFO};
use rpc_pb::Context;

use crate::error::Error;
use crate::types::{ServerSnapshot, UserViewEntry, ViewSeqEntry};
use crate::wire::{
    CopyReply, CopyRequest, HandleReply, HandleRequest, InitReply, InitRequest, QueryReply,
    QueryRequest, ServerClient, ServerService,
};

/// The interval between commit-applier sweeps (`update_delay` in `server.go`, 250ms).
pub const UPDATE_DELAY: Duration = Duration::from_millis(250);

static HANDLE_HIGH: Counter = Counter::new("gopad_server.handle.high");
static HANDLE_ORDER: Counter = Counter::new("gopad_server.handle.order");
static HANDLE_CLIENT: Counter = Counter::new("gopad_server.handle.client_mismatch");
static HANDLE_OK: Counter = Counter::new("gopad_server.handle.ok");
static INIT_FULL: Counter = Counter::new("gopad_server.init.full");
static INIT_OK: Counter = Counter::new("gopad_server.init.ok");
static QUERY_BAD: Counter = Counter::new("gopad_server.query.bad");
static QUERY_OK: Counter = Counter::new("gopad_server.query.ok");
static COPY_REBOOTING: Counter = Counter::new("gopad_server.copy.rebooting");
static OPS_COMMITTED: Counter = Counter::new("gopad_server.commit_applier.ops_committed");
static GC_SWEEPS: Counter = Counter::new("gopad_server.commit_applier.gc_sweeps");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&HANDLE_HIGH);
    collector.register_counter(&HANDLE_ORDER);
    collector.register_counter(&HANDLE_CLIENT);
    collector.register_counter(&HANDLE_OK);
    collector.register_counter(&INIT_FULL);
    collector.register_counter(&INIT_OK);
    collector.register_counter(&QUERY_BAD);
    collector.register_counter(&QUERY_OK);
    collector.register_counter(&COPY_REBOOTING);
    collector.register_counter(&OPS_COMMITTED);
    collector.register_counter(&GC_SWEEPS);
}

pub static LOGGING: indicio::Collector = indicio::Collector::new();

/// Mutable server state protected by one coarse lock, matching `server.go`'s single
/// `sync.Mutex` over the whole `Server` struct.
struct State {
    doc: Doc,
    commit_log: Vec<Op>,
    discard_point: u32,
    user_views: Vec<UserViewEntry>,
    view_seqs: Vec<ViewSeqEntry>,
    start_seq: i64,
    query_seq: i64,
}

impl State {
    fn bump_user_view(&mut self, client: ClientId, view: u32) {
        match self.user_views.iter_mut().find(|e| e.client == client) {
            Some(e) => {
                if view > e.view {
                    e.view = view;
                }
            }
            None => self.user_views.push(UserViewEntry { client, view }),
        }
    }
}

/// The replication server: accepts client RPCs, proposes batches through consensus, folds
/// decided batches into the canonical [Doc], and serves log tails back to clients.
///
/// Grounded on `examples/original_source/src/server.go`'s `Server` struct and its
/// `Init`/`Handle`/`Query`/`update` methods.
pub struct Server {
    me: usize,
    paxos: Arc<Paxos>,
    peers: Vec<Arc<dyn ServerService>>,
    state: Mutex<State>,
    xid_counter: AtomicU64,
    rebooting: AtomicBool,
}

impl Server {
    /// Construct a fresh server (no prior state) seeded with `doc`.
    pub fn new(
        me: usize,
        doc: Doc,
        paxos: Arc<Paxos>,
        peers: Vec<Arc<dyn ServerService>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            me,
            paxos,
            peers,
            state: Mutex::new(State {
                doc,
                commit_log: Vec::new(),
                discard_point: 0,
                user_views: Vec::new(),
                view_seqs: Vec::new(),
                start_seq: 0,
                query_seq: 0,
            }),
            xid_counter: AtomicU64::new(0),
            rebooting: AtomicBool::new(false),
        })
    }

    /// Construct a server that is recovering: marks itself `REBOOTING` to `Copy` callers until
    /// [Server::recover] installs a snapshot from a live peer.
    pub fn new_recovering(
        me: usize,
        paxos: Arc<Paxos>,
        peers: Vec<Arc<dyn ServerService>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            me,
            paxos,
            peers,
            state: Mutex::new(State {
                doc: Doc::empty(),
                commit_log: Vec::new(),
                discard_point: 0,
                user_views: Vec::new(),
                view_seqs: Vec::new(),
                start_seq: 0,
                query_seq: 0,
            }),
            xid_counter: AtomicU64::new(0),
            rebooting: AtomicBool::new(true),
        })
    }

    /// Poll `peers` until one returns a usable `Copy` snapshot, then install it and clear the
    /// `REBOOTING` flag. Grounded on `server.go`'s `Recover`.
    pub fn recover(&self, retry_delay: Duration) {
        let ctx = Context::default();
        loop {
            for (i, peer) in self.peers.iter().enumerate() {
                if i == self.me {
                    continue;
                }
                match peer.copy(&ctx, CopyRequest {}) {
                    Ok(reply) if reply.err == "OK" => {
                        if self.install_copy(&reply).is_ok() {
                            self.rebooting.store(false, Ordering::SeqCst);
                            clue!(LOGGING, INFO, { recovered_from_peer: {} });
                            return;
                        }
                    }
                    _ => {}
                }
            }
            std::thread::sleep(retry_delay);
        }
    }

    fn install_copy(&self, reply: &CopyReply) -> Result<(), Error> {
        let (doc, _): (Doc, _) = Doc::unpack(&reply.doc)?;
        let (srv, _): (ServerSnapshot, _) = ServerSnapshot::unpack(&reply.srv)?;
        let (px, _): (gopad_paxos::PaxosSnapshot, _) = gopad_paxos::PaxosSnapshot::unpack(&reply.px)?;
        self.paxos.install_snapshot(px);
        let mut state = self.state.lock().unwrap();
        state.doc = doc;
        state.commit_log = srv.commit_log;
        state.discard_point = srv.discard_point;
        state.user_views = srv.user_views;
        state.view_seqs = srv.view_seqs;
        state.start_seq = srv.start_seq;
        state.query_seq = srv.query_seq;
        Ok(())
    }

    fn fresh_xid(&self) -> u64 {
        let n = self.xid_counter.fetch_add(1, Ordering::Relaxed);
        (n << 16) | (self.me as u64 & 0xffff)
    }

    /// Propose `batch` at successive slots (this replica's own proposer cursor) until a slot
    /// decides in `batch`'s favor. Grounded on `server.go`'s `handleOp`.
    fn handle_op(&self, batch: Batch) -> Result<(), Error> {
        loop {
            let slot = {
                let mut state = self.state.lock().unwrap();
                let slot = state.start_seq;
                state.start_seq += 1;
                slot
            };
            let decided = self.paxos.start(slot, batch.clone())?;
            if decided.xid == batch.xid {
                return Ok(());
            }
        }
    }

    /// Pull decided slots in `query_seq` order, fold them into `doc`, and run log GC. Never
    /// returns; intended to run on its own thread. Grounded on `server.go`'s `update`.
    pub fn run_commit_applier(&self, poll_delay: Duration) {
        loop {
            if !self.try_commit_next_slot() {
                std::thread::sleep(poll_delay);
            }
        }
    }

    /// Apply the batch decided at the current `query_seq`, if any. Returns whether a slot was
    /// decided (and thus progress was made); split out from [Server::run_commit_applier] so the
    /// step is directly testable without a background thread.
    fn try_commit_next_slot(&self) -> bool {
        let query_seq = self.state.lock().unwrap().query_seq;
        let (fate, value) = self.paxos.status(query_seq);
        if fate != gopad_paxos::Fate::Decided {
            return false;
        }
        let Some(batch) = value else {
            return false;
        };
        let mut state = self.state.lock().unwrap();
        let mut view_max = 0u32;
        for op in &batch.ops {
            match state.doc.apply(op, false) {
                Ok(true) => {
                    state.commit_log.push(op.clone());
                    OPS_COMMITTED.click();
                }
                Ok(false) => {}
                Err(err) => {
                    clue!(LOGGING, INFO, {
                        malformed_op: {
                            what: format!("{:?}", err),
                        },
                    });
                }
            }
            if !matches!(op.kind(), Ok(OpKind::Init)) {
                state.bump_user_view(op.client, op.view);
            }
            view_max = view_max.max(op.view);
        }
        state.view_seqs.push(ViewSeqEntry {
            view: view_max,
            seq: query_seq,
        });
        state.query_seq += 1;
        self.run_log_gc(&mut state);
        true
    }

    /// Trim `commit_log` up to the minimum view every live client has acknowledged, and mark
    /// the consensus slots that produced those views as `done`. The only coupling between CC
    /// and client progress.
    fn run_log_gc(&self, state: &mut State) {
        let min_view = state.user_views.iter().map(|e| e.view).min();
        let Some(min_view) = min_view else {
            return;
        };
        if min_view > state.discard_point {
            let drop = (min_view - state.discard_point) as usize;
            if drop <= state.commit_log.len() {
                state.commit_log.drain(0..drop);
            }
            state.discard_point = min_view;
            GC_SWEEPS.click();
        }
        let mut done_slots = Vec::new();
        while let Some(front) = state.view_seqs.first() {
            if front.view <= min_view {
                done_slots.push(front.seq);
                state.view_seqs.remove(0);
            } else {
                break;
            }
        }
        for slot in done_slots {
            self.paxos.done(slot);
        }
    }
}

impl ServerService for Server {
    fn init(&self, _ctx: &Context, req: InitRequest) -> Result<InitReply, Error> {
        let client = req.client;
        let session: SessionId = req.session;
        let (already_current, full, seq) = {
            let state = self.state.lock().unwrap();
            let known = state.doc.color(client).is_some();
            (
                known && state.doc.user_session(client) == session,
                !known && state.doc.is_full(),
                state.doc.user_seq(client) + 1,
            )
        };
        if full {
            INIT_FULL.click();
            return Ok(InitReply {
                doc: Vec::new(),
                err: "Full".to_string(),
            });
        }
        if !already_current {
            let op = Op::init(client, session, seq, 0);
            let xid = self.fresh_xid();
            self.handle_op(Batch {
                ops: vec![op],
                xid,
            })?;
        }
        let state = self.state.lock().unwrap();
        INIT_OK.click();
        Ok(InitReply {
            doc: stack_pack(&state.doc).to_vec(),
            err: "OK".to_string(),
        })
    }

    fn handle(&self, _ctx: &Context, req: HandleRequest) -> Result<HandleReply, Error> {
        if req.ops.is_empty() {
            return Ok(HandleReply {
                err: "OK".to_string(),
            });
        }
        let client = req.ops[0].client;
        for w in req.ops.windows(2) {
            if w[1].client != w[0].client {
                HANDLE_CLIENT.click();
                return Ok(HandleReply {
                    err: "Client".to_string(),
                });
            }
            if w[1].seq != w[0].seq + 1 {
                HANDLE_ORDER.click();
                return Ok(HandleReply {
                    err: "Order".to_string(),
                });
            }
        }
        let user_seq = self.state.lock().unwrap().doc.user_seq(client);
        if req.ops[0].seq > user_seq + 1 {
            HANDLE_HIGH.click();
            return Ok(HandleReply {
                err: "High".to_string(),
            });
        }
        let last_seq = req.ops[req.ops.len() - 1].seq;
        if last_seq > user_seq {
            let xid = self.fresh_xid();
            self.handle_op(Batch {
                ops: req.ops,
                xid,
            })?;
        }
        HANDLE_OK.click();
        Ok(HandleReply {
            err: "OK".to_string(),
        })
    }

    fn query(&self, _ctx: &Context, req: QueryRequest) -> Result<QueryReply, Error> {
        let mut state = self.state.lock().unwrap();
        let commit_point = state.doc.view;
        if req.view > commit_point || req.view < state.discard_point {
            QUERY_BAD.click();
            return Ok(QueryReply {
                ops: Vec::new(),
                err: "BAD".to_string(),
            });
        }
        state.bump_user_view(req.client, req.view);
        let lo = (req.view - state.discard_point) as usize;
        let hi = (commit_point - state.discard_point) as usize;
        let ops = state.commit_log[lo..hi].to_vec();
        QUERY_OK.click();
        Ok(QueryReply {
            ops,
            err: "OK".to_string(),
        })
    }

    fn copy(&self, _ctx: &Context, _req: CopyRequest) -> Result<CopyReply, Error> {
        if self.rebooting.load(Ordering::SeqCst) {
            COPY_REBOOTING.click();
            return Ok(CopyReply {
                srv: Vec::new(),
                px: Vec::new(),
                doc: Vec::new(),
                err: "REBOOTING".to_string(),
            });
        }
        let state = self.state.lock().unwrap();
        let srv = ServerSnapshot {
            commit_log: state.commit_log.clone(),
            discard_point: state.discard_point,
            user_views: state.user_views.clone(),
            view_seqs: state.view_seqs.clone(),
            start_seq: state.start_seq,
            query_seq: state.query_seq,
        };
        let px = self.paxos.snapshot();
        Ok(CopyReply {
            srv: stack_pack(&srv).to_vec(),
            px: stack_pack(&px).to_vec(),
            doc: stack_pack(&state.doc).to_vec(),
            err: "OK".to_string(),
        })
    }
}

/// Lets a shared `Arc<Server>` be registered directly with a transport's service registry
/// alongside being held by the binary that runs its background threads.
impl ServerService for Arc<Server> {
    fn init(&self, ctx: &Context, req: InitRequest) -> Result<InitReply, Error> {
        (**self).init(ctx, req)
    }

    fn handle(&self, ctx: &Context, req: HandleRequest) -> Result<HandleReply, Error> {
        (**self).handle(ctx, req)
    }

    fn query(&self, ctx: &Context, req: QueryRequest) -> Result<QueryReply, Error> {
        (**self).query(ctx, req)
    }

    fn copy(&self, ctx: &Context, req: CopyRequest) -> Result<CopyReply, Error> {
        (**self).copy(ctx, req)
    }
}

/// Wrap a dialed `rpc_pb::Client` (e.g. `gopad_transport::DialClient`) as a typed `ServerClient`
/// for reaching a peer's `Init`/`Handle`/`Query`/`Copy` RPCs.
pub fn server_client(client: Arc<dyn rpc_pb::Client + Send + Sync + 'static>) -> ServerClient {
    ServerClient::new(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gopad_paxos::{
        AcceptReply, AcceptRequest, DecidedReply, DecidedRequest, PrepareReply, PrepareRequest,
        ReplyDoneReply, ReplyDoneRequest,
    };

    /// Placeholder peer for the single-node test cluster; `Paxos::start` never dials it because
    /// index `0 == me` routes through the local handlers instead. Same idiom as
    /// `gopad_paxos::paxos::tests::Unreachable`.
    struct Unreachable;

    impl gopad_paxos::PaxosService for Unreachable {
        fn prepare(
            &self,
            _ctx: &Context,
            _req: PrepareRequest,
        ) -> Result<PrepareReply, gopad_paxos::Error> {
            panic!("unreachable peer dialed")
        }
        fn accept(
            &self,
            _ctx: &Context,
            _req: AcceptRequest,
        ) -> Result<AcceptReply, gopad_paxos::Error> {
            panic!("unreachable peer dialed")
        }
        fn decided(
            &self,
            _ctx: &Context,
            _req: DecidedRequest,
        ) -> Result<DecidedReply, gopad_paxos::Error> {
            panic!("unreachable peer dialed")
        }
        fn reply_done(
            &self,
            _ctx: &Context,
            _req: ReplyDoneRequest,
        ) -> Result<ReplyDoneReply, gopad_paxos::Error> {
            panic!("unreachable peer dialed")
        }
    }

    fn test_server() -> Arc<Server> {
        let paxos = Arc::new(Paxos::new(0, vec![Arc::new(Unreachable)]));
        Server::new(0, Doc::empty(), paxos, vec![])
    }

    #[test]
    fn handle_high_when_seq_skips_ahead() {
        let server = test_server();
        let ctx = Context::default();
        let op = Op::insert(1, 0, 5, 0, 'x');
        let reply = server
            .handle(&ctx, HandleRequest { ops: vec![op], xid: 0 })
            .unwrap();
        assert_eq!(reply.err, "High");
    }

    #[test]
    fn handle_order_when_batch_seq_not_monotonic() {
        let server = test_server();
        let ctx = Context::default();
        let ops = vec![Op::insert(1, 0, 1, 0, 'a'), Op::insert(1, 0, 3, 0, 'b')];
        let reply = server.handle(&ctx, HandleRequest { ops, xid: 0 }).unwrap();
        assert_eq!(reply.err, "Order");
    }

    #[test]
    fn handle_client_when_batch_mixes_clients() {
        let server = test_server();
        let ctx = Context::default();
        let ops = vec![Op::insert(1, 0, 1, 0, 'a'), Op::insert(2, 0, 2, 0, 'b')];
        let reply = server.handle(&ctx, HandleRequest { ops, xid: 0 }).unwrap();
        assert_eq!(reply.err, "Client");
    }

    #[test]
    fn handle_commits_a_valid_batch_and_advances_start_seq() {
        let server = test_server();
        let ctx = Context::default();
        let op = Op::insert(1, 0, 1, 0, 'a');
        let reply = server
            .handle(&ctx, HandleRequest { ops: vec![op], xid: 0 })
            .unwrap();
        assert_eq!(reply.err, "OK");
        assert_eq!(server.state.lock().unwrap().start_seq, 1);
    }

    /// `init`/`handle` only propose a batch through consensus; the commit-applier (run here as
    /// one explicit step rather than a background thread) is what actually folds the decided
    /// batch into `doc`. Matches the real process, where `init` can legitimately return before
    /// its own op is visible in the snapshot -- the client's bootstrap poll against `Query`
    /// exists precisely to cover that gap.
    #[test]
    fn init_assigns_a_color_once_the_commit_applier_folds_it_in() {
        let server = test_server();
        let ctx = Context::default();
        let reply = server
            .init(&ctx, InitRequest { client: 1, session: 7 })
            .unwrap();
        assert_eq!(reply.err, "OK");
        assert!(server.try_commit_next_slot());
        let state = server.state.lock().unwrap();
        assert_eq!(state.doc.color(1), Some(1));
        assert_eq!(state.doc.user_session(1), 7);
    }

    #[test]
    fn init_is_idempotent_for_the_same_session() {
        let server = test_server();
        let ctx = Context::default();
        server
            .init(&ctx, InitRequest { client: 1, session: 7 })
            .unwrap();
        assert!(server.try_commit_next_slot());
        let start_seq_after_first = server.state.lock().unwrap().start_seq;
        let reply = server
            .init(&ctx, InitRequest { client: 1, session: 7 })
            .unwrap();
        assert_eq!(reply.err, "OK");
        assert_eq!(
            server.state.lock().unwrap().start_seq,
            start_seq_after_first,
            "a repeated Init with the same session should not propose another op"
        );
    }

    #[test]
    fn log_gc_trims_commit_log_and_marks_slots_done() {
        let server = test_server();
        let mut state = server.state.lock().unwrap();
        state.commit_log = vec![
            Op::insert(1, 0, 1, 1, 'a'),
            Op::insert(1, 0, 2, 2, 'b'),
            Op::insert(1, 0, 3, 3, 'c'),
        ];
        state.discard_point = 0;
        state.user_views = vec![
            UserViewEntry { client: 1, view: 2 },
            UserViewEntry { client: 2, view: 2 },
        ];
        state.view_seqs = vec![
            ViewSeqEntry { view: 1, seq: 0 },
            ViewSeqEntry { view: 2, seq: 1 },
            ViewSeqEntry { view: 3, seq: 2 },
        ];
        server.run_log_gc(&mut state);
        assert_eq!(state.discard_point, 2);
        assert_eq!(state.commit_log.len(), 1);
        assert_eq!(state.view_seqs.len(), 1);
        assert_eq!(state.view_seqs[0].seq, 2);
    }
}
