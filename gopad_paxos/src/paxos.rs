use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use biometrics::Counter;
use gopad_document::Batch;
use guacamole::{FromGuacamole, Guacamole};
use rpc_pb::Context;

use crate::types::{Fate, PaxosSnapshot, SlotSnapshot, SlotState};
use crate::wire::{
    AcceptReply, AcceptRequest, DecidedReply, DecidedRequest, PrepareReply, PrepareRequest,
    ReplyDoneReply, ReplyDoneRequest,
};
use crate::{Error, PaxosService};

static ROUNDS_STARTED: Counter = Counter::new("gopad_paxos.rounds_started");
static ROUNDS_WON: Counter = Counter::new("gopad_paxos.rounds_won");
static PREPARE_REJECTED: Counter = Counter::new("gopad_paxos.prepare_rejected");
static ACCEPT_REJECTED: Counter = Counter::new("gopad_paxos.accept_rejected");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&ROUNDS_STARTED);
    collector.register_counter(&ROUNDS_WON);
    collector.register_counter(&PREPARE_REJECTED);
    collector.register_counter(&ACCEPT_REJECTED);
}

/// Single-decree Multi-Paxos over an indefinite sequence of slots, each decree a [Batch] of
/// document ops. One [Paxos] per replica; `peers[me]` is this replica, called directly rather
/// than through the network.
pub struct Paxos {
    me: usize,
    peers: Vec<Arc<dyn PaxosService>>,
    slots: Mutex<BTreeMap<i64, SlotState>>,
    done_seqs: Mutex<Vec<i64>>,
    hi: Mutex<i64>,
}

impl Paxos {
    pub fn new(me: usize, peers: Vec<Arc<dyn PaxosService>>) -> Self {
        let n = peers.len();
        Self {
            me,
            peers,
            slots: Mutex::new(BTreeMap::new()),
            done_seqs: Mutex::new(vec![-1; n]),
            hi: Mutex::new(-1),
        }
    }

    fn quorum(&self) -> usize {
        self.peers.len() / 2 + 1
    }

    /// Run Phase 1 and Phase 2 until `slot` decides, returning the value that actually won (it
    /// may not be `value` if a competing proposer's batch was already accepted for the slot).
    pub fn start(&self, slot: i64, value: Batch) -> Result<Batch, Error> {
        ROUNDS_STARTED.click();
        {
            let mut slots = self.slots.lock().unwrap();
            slots.entry(slot).or_insert_with(SlotState::new);
        }
        let mut rng = Guacamole::new(backoff_seed(self.me, slot));
        loop {
            if let Some(decided) = self.decided_value(slot) {
                ROUNDS_WON.click();
                return Ok(decided);
            }
            let n = self.next_proposal(slot);
            match self.try_round(slot, n, value.clone()) {
                Some(decided) => {
                    self.broadcast_decided(slot, &decided);
                    ROUNDS_WON.click();
                    return Ok(decided);
                }
                None => {
                    let backoff: u16 = FromGuacamole::from_guacamole(&mut (), &mut rng);
                    std::thread::sleep(Duration::from_millis((backoff % 20) as u64));
                }
            }
        }
    }

    fn next_proposal(&self, slot: i64) -> i64 {
        let n = self.peers.len().max(1) as i64;
        let floor = {
            let slots = self.slots.lock().unwrap();
            slots.get(&slot).map(|s| s.hi_prepare).unwrap_or(0)
        };
        let mut k = floor / n + 1;
        let mut candidate = k * n + self.me as i64;
        while candidate <= floor {
            k += 1;
            candidate = k * n + self.me as i64;
        }
        candidate
    }

    fn try_round(&self, slot: i64, n: i64, mut value: Batch) -> Option<Batch> {
        let ctx = Context::default();
        let mut accepted = 0usize;
        let mut best_accept = 0i64;
        for (i, peer) in self.peers.iter().enumerate() {
            let reply = if i == self.me {
                self.handle_prepare(PrepareRequest { slot, n })
            } else {
                peer.prepare(&ctx, PrepareRequest { slot, n }).ok()?
            };
            if reply.ok {
                accepted += 1;
                if reply.n_a > best_accept {
                    if let Some(v) = reply.value {
                        best_accept = reply.n_a;
                        value = v;
                    }
                }
            } else {
                PREPARE_REJECTED.click();
                self.bump_hi_prepare(slot, reply.hi);
                return None;
            }
        }
        if accepted < self.quorum() {
            return None;
        }

        let mut accepted = 0usize;
        for (i, peer) in self.peers.iter().enumerate() {
            let reply = if i == self.me {
                self.handle_accept(AcceptRequest {
                    slot,
                    n,
                    value: value.clone(),
                })
            } else {
                peer.accept(
                    &ctx,
                    AcceptRequest {
                        slot,
                        n,
                        value: value.clone(),
                    },
                )
                .ok()?
            };
            if reply.ok {
                accepted += 1;
            } else {
                ACCEPT_REJECTED.click();
            }
        }
        if accepted < self.quorum() {
            return None;
        }
        Some(value)
    }

    fn broadcast_decided(&self, slot: i64, value: &Batch) {
        let ctx = Context::default();
        for (i, peer) in self.peers.iter().enumerate() {
            if i == self.me {
                let _ = self.handle_decided(DecidedRequest {
                    slot,
                    value: value.clone(),
                });
            } else {
                let _ = peer.decided(
                    &ctx,
                    DecidedRequest {
                        slot,
                        value: value.clone(),
                    },
                );
            }
        }
    }

    fn decided_value(&self, slot: i64) -> Option<Batch> {
        let slots = self.slots.lock().unwrap();
        slots
            .get(&slot)
            .filter(|s| s.fate == Fate::Decided)
            .and_then(|s| s.value.clone())
    }

    fn bump_hi_prepare(&self, slot: i64, n: i64) {
        let mut slots = self.slots.lock().unwrap();
        let state = slots.entry(slot).or_insert_with(SlotState::new);
        if n > state.hi_prepare {
            state.hi_prepare = n;
        }
    }

    /// Disposition and (if decided) value of `slot`, inspecting only local state.
    pub fn status(&self, slot: i64) -> (Fate, Option<Batch>) {
        let slots = self.slots.lock().unwrap();
        match slots.get(&slot) {
            None => (Fate::Pending, None),
            Some(s) => (s.fate, s.value.clone()),
        }
    }

    /// The highest slot this replica has ever seen proposed or learned.
    pub fn max(&self) -> i64 {
        *self.hi.lock().unwrap()
    }

    /// Slots below this have been forgotten; callers must not `start` or `status` them.
    pub fn min(&self) -> i64 {
        let done = self.done_seqs.lock().unwrap();
        done.iter().copied().min().unwrap_or(-1) + 1
    }

    /// Mark all slots `<= slot` as no longer needed locally, then gossip this watermark to
    /// peers and forget anything every replica has passed.
    pub fn done(&self, slot: i64) {
        {
            let mut done = self.done_seqs.lock().unwrap();
            if done[self.me] < slot {
                done[self.me] = slot;
            }
        }
        self.propagate_done();
        self.update_min();
    }

    fn propagate_done(&self) {
        let ctx = Context::default();
        let me_done = self.done_seqs.lock().unwrap()[self.me];
        for (i, peer) in self.peers.iter().enumerate() {
            if i == self.me {
                continue;
            }
            if let Ok(reply) = peer.reply_done(
                &ctx,
                ReplyDoneRequest {
                    me: self.me as u64,
                    done: me_done,
                },
            ) {
                let mut done = self.done_seqs.lock().unwrap();
                done[i] = reply.done;
            }
        }
    }

    fn update_min(&self) {
        let newmin = {
            let done = self.done_seqs.lock().unwrap();
            done.iter().copied().min().unwrap_or(-1)
        };
        let mut slots = self.slots.lock().unwrap();
        let keys: Vec<i64> = slots
            .keys()
            .copied()
            .filter(|&slot| slot <= newmin)
            .collect();
        for slot in keys {
            if let Some(state) = slots.get_mut(&slot) {
                state.fate = Fate::Forgotten;
                state.value = None;
            }
        }
    }

    fn handle_prepare(&self, req: PrepareRequest) -> PrepareReply {
        let mut slots = self.slots.lock().unwrap();
        let state = slots.entry(req.slot).or_insert_with(SlotState::new);
        if req.n > state.hi_prepare {
            state.hi_prepare = req.n;
            PrepareReply {
                ok: true,
                n_a: state.hi_accept,
                value: state.value.clone(),
                hi: 0,
            }
        } else {
            PrepareReply {
                ok: false,
                n_a: 0,
                value: None,
                hi: state.hi_prepare,
            }
        }
    }

    fn handle_accept(&self, req: AcceptRequest) -> AcceptReply {
        let mut slots = self.slots.lock().unwrap();
        let state = slots.entry(req.slot).or_insert_with(SlotState::new);
        if req.n >= state.hi_prepare {
            state.hi_prepare = req.n;
            state.hi_accept = req.n;
            state.value = Some(req.value);
            self.bump_max(req.slot);
            AcceptReply {
                ok: true,
                hi: req.n,
            }
        } else {
            AcceptReply {
                ok: false,
                hi: state.hi_prepare,
            }
        }
    }

    fn handle_decided(&self, req: DecidedRequest) -> DecidedReply {
        let mut slots = self.slots.lock().unwrap();
        let state = slots.entry(req.slot).or_insert_with(SlotState::new);
        state.fate = Fate::Decided;
        state.value = Some(req.value);
        drop(slots);
        self.bump_max(req.slot);
        DecidedReply { ok: true }
    }

    fn handle_reply_done(&self, req: ReplyDoneRequest) -> ReplyDoneReply {
        {
            let mut done = self.done_seqs.lock().unwrap();
            let idx = req.me as usize;
            if idx < done.len() {
                done[idx] = req.done;
            }
        }
        self.update_min();
        ReplyDoneReply {
            done: self.done_seqs.lock().unwrap()[self.me],
        }
    }

    /// A state-transfer snapshot of every decided slot, for seeding a recovering peer.
    /// Grounded on `paxos.go`'s `Copy` handler, which ships `px` as an opaque blob for a
    /// restarting replica to install via `Recover`.
    pub fn snapshot(&self) -> PaxosSnapshot {
        let slots = self.slots.lock().unwrap();
        let decided = slots
            .iter()
            .filter(|(_, s)| s.fate == Fate::Decided)
            .map(|(&slot, s)| SlotSnapshot {
                slot,
                value: s.value.clone(),
            })
            .collect();
        PaxosSnapshot {
            decided,
            done_seqs: self.done_seqs.lock().unwrap().clone(),
            hi: *self.hi.lock().unwrap(),
        }
    }

    /// Install a snapshot fetched from a live peer. Used only by a freshly started replica
    /// before it begins serving traffic.
    pub fn install_snapshot(&self, snapshot: PaxosSnapshot) {
        let mut slots = self.slots.lock().unwrap();
        for entry in snapshot.decided {
            slots.insert(
                entry.slot,
                SlotState {
                    fate: Fate::Decided,
                    hi_prepare: 0,
                    hi_accept: 0,
                    value: entry.value,
                },
            );
        }
        drop(slots);
        *self.done_seqs.lock().unwrap() = snapshot.done_seqs;
        *self.hi.lock().unwrap() = snapshot.hi;
    }

    fn bump_max(&self, slot: i64) {
        let mut hi = self.hi.lock().unwrap();
        if slot > *hi {
            *hi = slot;
        }
    }
}

impl PaxosService for Paxos {
    fn prepare(&self, _ctx: &Context, req: PrepareRequest) -> Result<PrepareReply, Error> {
        Ok(self.handle_prepare(req))
    }

    fn accept(&self, _ctx: &Context, req: AcceptRequest) -> Result<AcceptReply, Error> {
        Ok(self.handle_accept(req))
    }

    fn decided(&self, _ctx: &Context, req: DecidedRequest) -> Result<DecidedReply, Error> {
        Ok(self.handle_decided(req))
    }

    fn reply_done(&self, _ctx: &Context, req: ReplyDoneRequest) -> Result<ReplyDoneReply, Error> {
        Ok(self.handle_reply_done(req))
    }
}

/// Lets a shared `Arc<Paxos>` be registered directly with a transport's service registry
/// alongside being held by the server that calls its methods in-process.
impl PaxosService for Arc<Paxos> {
    fn prepare(&self, ctx: &Context, req: PrepareRequest) -> Result<PrepareReply, Error> {
        (**self).prepare(ctx, req)
    }

    fn accept(&self, ctx: &Context, req: AcceptRequest) -> Result<AcceptReply, Error> {
        (**self).accept(ctx, req)
    }

    fn decided(&self, ctx: &Context, req: DecidedRequest) -> Result<DecidedReply, Error> {
        (**self).decided(ctx, req)
    }

    fn reply_done(&self, ctx: &Context, req: ReplyDoneRequest) -> Result<ReplyDoneReply, Error> {
        (**self).reply_done(ctx, req)
    }
}

fn backoff_seed(me: usize, slot: i64) -> u64 {
    (me as u64).wrapping_mul(0x9E3779B97F4A7C15) ^ (slot as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(xid: u64) -> Batch {
        Batch { ops: vec![], xid }
    }

    /// Placeholder peer for `me`'s own slot in the peers vector; `try_round` never dials it
    /// because `i == self.me` routes through the direct handlers instead.
    struct Unreachable;

    impl PaxosService for Unreachable {
        fn prepare(&self, _ctx: &Context, _req: PrepareRequest) -> Result<PrepareReply, Error> {
            panic!("unreachable peer dialed")
        }
        fn accept(&self, _ctx: &Context, _req: AcceptRequest) -> Result<AcceptReply, Error> {
            panic!("unreachable peer dialed")
        }
        fn decided(&self, _ctx: &Context, _req: DecidedRequest) -> Result<DecidedReply, Error> {
            panic!("unreachable peer dialed")
        }
        fn reply_done(
            &self,
            _ctx: &Context,
            _req: ReplyDoneRequest,
        ) -> Result<ReplyDoneReply, Error> {
            panic!("unreachable peer dialed")
        }
    }

    fn single_peer() -> Paxos {
        let peers: Vec<Arc<dyn PaxosService>> = vec![Arc::new(Unreachable)];
        Paxos::new(0, peers)
    }

    #[test]
    fn solo_replica_decides_its_own_value() {
        let px = single_peer();
        let decided = px.start(0, batch(7)).unwrap();
        assert_eq!(decided.xid, 7);
        assert_eq!(px.status(0).0, Fate::Decided);
    }

    #[test]
    fn prepare_rejects_stale_proposal_number() {
        let px = single_peer();
        let hi = px.handle_prepare(PrepareRequest { slot: 3, n: 10 });
        assert!(hi.ok);
        let stale = px.handle_prepare(PrepareRequest { slot: 3, n: 5 });
        assert!(!stale.ok);
        assert_eq!(stale.hi, 10);
    }

    #[test]
    fn accept_carries_value_into_later_prepare_reply() {
        let px = single_peer();
        assert!(px.handle_prepare(PrepareRequest { slot: 1, n: 1 }).ok);
        assert!(px
            .handle_accept(AcceptRequest {
                slot: 1,
                n: 1,
                value: batch(42),
            })
            .ok);
        let reply = px.handle_prepare(PrepareRequest { slot: 1, n: 2 });
        assert!(reply.ok);
        assert_eq!(reply.value.unwrap().xid, 42);
    }

    #[test]
    fn decided_is_idempotent_and_bumps_max() {
        let px = single_peer();
        px.handle_decided(DecidedRequest {
            slot: 5,
            value: batch(1),
        });
        px.handle_decided(DecidedRequest {
            slot: 5,
            value: batch(1),
        });
        assert_eq!(px.status(5).0, Fate::Decided);
        assert_eq!(px.max(), 5);
    }

    #[test]
    fn done_forgets_slots_below_watermark() {
        let px = single_peer();
        px.handle_decided(DecidedRequest {
            slot: 0,
            value: batch(1),
        });
        px.done(0);
        assert_eq!(px.status(0).0, Fate::Forgotten);
        assert_eq!(px.min(), 1);
    }

    #[test]
    fn proposal_numbers_are_unique_across_replica_indices() {
        fn three_peers() -> Vec<Arc<dyn PaxosService>> {
            vec![
                Arc::new(Unreachable),
                Arc::new(Unreachable),
                Arc::new(Unreachable),
            ]
        }
        let a = Paxos::new(0, three_peers());
        let b = Paxos::new(1, three_peers());
        assert_ne!(a.next_proposal(0) % 3, b.next_proposal(0) % 3);
    }
}
