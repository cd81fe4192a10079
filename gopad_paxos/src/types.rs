use gopad_document::Batch;
use prototk_derive::Message;

/// Disposition of a single consensus slot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Fate {
    #[default]
    Pending,
    Decided,
    Forgotten,
}

/// Local bookkeeping for one Paxos slot (one decree).
///
/// `hi_prepare` and `hi_accept` track the highest proposal number this acceptor has
/// promised/accepted, per the Prepare/Accept rules in the consensus literature; `value` is
/// populated once a Phase 2 Accept (or a learned Decided) carries a batch for this slot.
#[derive(Clone, Debug, Default)]
pub struct SlotState {
    pub fate: Fate,
    pub hi_prepare: i64,
    pub hi_accept: i64,
    pub value: Option<Batch>,
}

impl SlotState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_decided(&self) -> bool {
        self.fate == Fate::Decided
    }
}

/// Wire-level snapshot of a slot, used to seed a fresh acceptor during state transfer and in
/// the `Decided` RPC.
#[derive(Clone, Debug, Default, Message)]
pub struct SlotSnapshot {
    #[prototk(1, int64)]
    pub slot: i64,
    #[prototk(2, message)]
    pub value: Option<Batch>,
}

/// A full state transfer of one replica's [crate::Paxos], enough to resume participation
/// without replaying Prepare/Accept for already-decided slots.  Only decided slots are carried;
/// a recovering replica has no in-flight proposals of its own to lose.
#[derive(Clone, Debug, Default, Message)]
pub struct PaxosSnapshot {
    #[prototk(1, message)]
    pub decided: Vec<SlotSnapshot>,
    #[prototk(2, int64)]
    pub done_seqs: Vec<i64>,
    #[prototk(3, int64)]
    pub hi: i64,
}
