use gopad_document::{ClientId, Doc, Op, SessionId};

use crate::error::Error;

/// Everything a render frame or a sync tick needs, behind one lock.
///
/// Grounded on `client.go`'s `gopad` struct: `doc`/`committed_doc` is the last state proven by a
/// decided, applied op; `tempdoc`/`tentative_doc` is `doc` plus `self_ops` replayed optimistically
/// so the local cursor and freshly typed characters show up before the round trip to the server
/// completes.
pub struct ClientState {
    pub me: ClientId,
    pub session: SessionId,
    pub committed_doc: Doc,
    pub tentative_doc: Doc,
    /// Ops this client has produced but not yet seen reflected in `committed_doc`, oldest first.
    pub self_ops: Vec<Op>,
    pub op_num: u32,
    pub filename: Option<String>,
    pub status: String,
}

impl ClientState {
    pub fn new(me: ClientId, session: SessionId, doc: Doc, filename: Option<String>) -> Self {
        let op_num = doc.user_seq(me);
        Self {
            me,
            session,
            tentative_doc: doc.clone(),
            committed_doc: doc,
            self_ops: Vec::new(),
            op_num,
            filename,
            status: String::new(),
        }
    }

    /// Append `op` to the pending queue (stamping `seq`/`session`) and apply it to
    /// `tentative_doc` right away, marked as not yet committed.
    pub fn log_op(&mut self, mut op: Op) -> Result<(), Error> {
        self.op_num += 1;
        op.seq = self.op_num;
        op.session = self.session;
        op.view = self.committed_doc.view;
        self.tentative_doc.apply(&op, true)?;
        self.self_ops.push(op);
        Ok(())
    }

    /// Fold newly decided `ops` into `committed_doc`, trim `self_ops` by however many of this
    /// client's own ops just became reflected in `committed_doc`, then rebuild `tentative_doc` as
    /// a fresh copy of `committed_doc` with the remaining `self_ops` replayed on top.
    ///
    /// Returns `true` if any op in `ops` was a decided `Init` for `(client, session)` -- used only
    /// during startup, to know when this client's own membership has landed.
    pub fn apply_commits(&mut self, ops: &[Op]) -> Result<bool, Error> {
        let before = self.committed_doc.user_seq(self.me);
        let mut saw_own_init = false;
        for op in ops {
            if self.committed_doc.apply(op, false)?
                && matches!(op.kind(), Ok(gopad_document::OpKind::Init))
                && op.client == self.me
                && op.session == self.session
            {
                saw_own_init = true;
            }
        }
        let after = self.committed_doc.user_seq(self.me);
        if after > before {
            let trim = (after - before) as usize;
            self.self_ops.drain(0..trim.min(self.self_ops.len()));
        }
        self.rebase();
        Ok(saw_own_init)
    }

    /// Resync `op_num` to the committed sequence number. Needed once, right after bootstrap: the
    /// snapshot an `Init` reply carries can predate this client's own Init being decided and
    /// applied, so `op_num` (set from that snapshot) can be stale until the bootstrap Query loop
    /// catches it up.
    pub fn resync_op_num(&mut self) {
        self.op_num = self.committed_doc.user_seq(self.me);
    }

    fn rebase(&mut self) {
        self.tentative_doc = self.committed_doc.clone();
        for op in self.self_ops.clone() {
            // Already admitted once when queued; a rebase replay can only be rejected if a
            // concurrent commit advanced user_seq further than the trim above accounted for,
            // which cannot happen since the trim is derived from that very same user_seq.
            let _ = self.tentative_doc.apply(&op, true);
        }
    }
}
