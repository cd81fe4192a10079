use prototk_derive::Message;

use crate::error::Error;
use crate::types::{ClientId, Direction, OpKind, SessionId};

////////////////////////////////////////////////// Op ///////////////////////////////////////////////

/// A single edit operation, as produced by a client and eventually decided by consensus.
///
/// `kind` and `dir` are carried as raw integers on the wire (matching the rune/int fields of the
/// format this protocol descends from) and interpreted through [OpKind]/[Direction] at the
/// points that need them; this keeps the wire struct a flat, allocation-free record.
#[derive(Clone, Debug, Default, Eq, PartialEq, Message)]
pub struct Op {
    #[prototk(1, uint32)]
    pub kind: u32,
    /// Unicode scalar value inserted; meaningful only when `kind == Insert`.
    #[prototk(2, uint32)]
    pub data: u32,
    /// Meaningful only when `kind == Move`.
    #[prototk(3, uint32)]
    pub dir: u32,
    #[prototk(4, uint32)]
    pub session: SessionId,
    #[prototk(5, uint32)]
    pub view: u32,
    #[prototk(6, uint32)]
    pub seq: u32,
    #[prototk(7, int32)]
    pub client: ClientId,
}

impl Op {
    fn new(kind: OpKind, client: ClientId, session: SessionId, seq: u32, view: u32) -> Self {
        Self {
            kind: kind.into(),
            data: 0,
            dir: 0,
            session,
            view,
            seq,
            client,
        }
    }

    pub fn kind(&self) -> Result<OpKind, Error> {
        OpKind::try_from(self.kind)
    }

    pub fn direction(&self) -> Result<Direction, Error> {
        Direction::try_from(self.dir)
    }

    pub fn data_char(&self) -> Result<char, Error> {
        char::from_u32(self.data).ok_or(Error::InvalidCodepoint {
            core: Default::default(),
            value: self.data,
        })
    }

    pub fn insert(client: ClientId, session: SessionId, seq: u32, view: u32, ch: char) -> Self {
        let mut op = Self::new(OpKind::Insert, client, session, seq, view);
        op.data = ch as u32;
        op
    }

    pub fn delete(client: ClientId, session: SessionId, seq: u32, view: u32) -> Self {
        Self::new(OpKind::Delete, client, session, seq, view)
    }

    pub fn newline(client: ClientId, session: SessionId, seq: u32, view: u32) -> Self {
        Self::new(OpKind::Newline, client, session, seq, view)
    }

    pub fn init(client: ClientId, session: SessionId, seq: u32, view: u32) -> Self {
        Self::new(OpKind::Init, client, session, seq, view)
    }

    pub fn mv(client: ClientId, session: SessionId, seq: u32, view: u32, dir: Direction) -> Self {
        let mut op = Self::new(OpKind::Move, client, session, seq, view);
        op.dir = dir.into();
        op
    }
}

////////////////////////////////////////////////// Batch ////////////////////////////////////////////

/// An ordered group of ops produced by a single client, proposed atomically into consensus.
#[derive(Clone, Debug, Default, Message)]
pub struct Batch {
    #[prototk(1, message)]
    pub ops: Vec<Op>,
    /// A proposer-chosen nonce; lets a proposer recognize its own batch among those decided.
    #[prototk(2, uint64)]
    pub xid: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use buffertk::{stack_pack, Unpackable};

    #[test]
    fn op_roundtrip() {
        let op = Op::insert(1, 7, 2, 0, 'H');
        let buf = stack_pack(&op).to_vec();
        let got = Op::unpack(&buf).unwrap().0;
        assert_eq!(op, got);
        assert_eq!(got.kind().unwrap(), OpKind::Insert);
        assert_eq!(got.data_char().unwrap(), 'H');
        assert_eq!(got.session, 7);
    }

    #[test]
    fn batch_roundtrip() {
        let batch = Batch {
            ops: vec![Op::insert(1, 7, 2, 0, 'H'), Op::insert(1, 7, 3, 0, 'i')],
            xid: 42,
        };
        let buf = stack_pack(&batch).to_vec();
        let got = Batch::unpack(&buf).unwrap().0;
        assert_eq!(got.xid, 42);
        assert_eq!(got.ops.len(), 2);
    }
}
