use biometrics::Counter;
use prototk_derive::Message;

use crate::error::Error;
use crate::op::Op;
use crate::types::{ClientId, ColorEntry, Direction, OpKind, Pos, PosEntry, Row, SeqEntry,
    SessionEntry, SessionId};

/// The maximum number of distinct clients a single [Doc] will admit.
pub const MAXUSERS: usize = 3;

static OPS_APPLIED: Counter = Counter::new("gopad_document.ops_applied");
static OPS_REJECTED: Counter = Counter::new("gopad_document.ops_rejected");

/// Register this module's counters with `collector`.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&OPS_APPLIED);
    collector.register_counter(&OPS_REJECTED);
}

///////////////////////////////////////////////// Doc ///////////////////////////////////////////////

/// The canonical, replicated document.
///
/// A pure function of the ordered sequence of ops applied to it via [Doc::apply].  `Doc` carries
/// every piece of state that must be bit-identical across replicas, including the per-client
/// position/sequence/session tables and the color palette -- nothing here is process-global.
#[derive(Clone, Debug, Default, PartialEq, Message)]
pub struct Doc {
    #[prototk(1, message)]
    pub rows: Vec<Row>,
    #[prototk(2, uint32)]
    pub view: u32,
    #[prototk(3, message)]
    pub colors: Vec<ColorEntry>,
    /// Known clients in the order their first Init was admitted. Carried on the wire for parity
    /// with deterministic iteration of the other tables; has no bearing on semantics.
    #[prototk(4, int32)]
    pub known_clients: Vec<ClientId>,
    #[prototk(5, message)]
    pub user_pos: Vec<PosEntry>,
    #[prototk(6, message)]
    pub user_seq: Vec<SeqEntry>,
    #[prototk(7, message)]
    pub user_session: Vec<SessionEntry>,
}

impl Doc {
    /// A fresh document with a single empty row, as created on server start with no file.
    pub fn empty() -> Self {
        Self {
            rows: vec![Row::new()],
            ..Default::default()
        }
    }

    /// A fresh document whose rows are the lines of `text`.
    pub fn from_text(text: &str) -> Self {
        let mut rows: Vec<Row> = text.lines().map(Row::from_str).collect();
        if rows.is_empty() {
            rows.push(Row::new());
        }
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn is_full(&self) -> bool {
        self.colors.len() >= MAXUSERS
    }

    pub fn user_pos(&self, client: ClientId) -> Pos {
        self.user_pos
            .iter()
            .find(|e| e.client == client)
            .map(|e| e.pos)
            .unwrap_or(Pos::ORIGIN)
    }

    fn set_user_pos(&mut self, client: ClientId, pos: Pos) {
        match self.user_pos.iter_mut().find(|e| e.client == client) {
            Some(e) => e.pos = pos,
            None => self.user_pos.push(PosEntry { client, pos }),
        }
    }

    pub fn user_seq(&self, client: ClientId) -> u32 {
        self.user_seq
            .iter()
            .find(|e| e.client == client)
            .map(|e| e.seq)
            .unwrap_or(0)
    }

    fn set_user_seq(&mut self, client: ClientId, seq: u32) {
        match self.user_seq.iter_mut().find(|e| e.client == client) {
            Some(e) => e.seq = seq,
            None => self.user_seq.push(SeqEntry { client, seq }),
        }
    }

    pub fn user_session(&self, client: ClientId) -> SessionId {
        self.user_session
            .iter()
            .find(|e| e.client == client)
            .map(|e| e.session)
            .unwrap_or(0)
    }

    fn set_user_session(&mut self, client: ClientId, session: SessionId) {
        match self.user_session.iter_mut().find(|e| e.client == client) {
            Some(e) => e.session = session,
            None => self.user_session.push(SessionEntry { client, session }),
        }
    }

    pub fn color(&self, client: ClientId) -> Option<u32> {
        self.colors.iter().find(|e| e.client == client).map(|e| e.color)
    }

    /// Decide admissibility of `op` and, if admitted, mutate `self` in place.
    ///
    /// `temp` marks whether the inserted text should render as not-yet-committed (a client
    /// applying its own pending ops to a scratch copy) or as settled (every other caller,
    /// including replaying the committed log). It only affects [Row]'s `temp` column; it has no
    /// bearing on admission or cursor arithmetic.
    ///
    /// Returns whether the op was applied. Never fails except on a malformed `op` (unknown
    /// discriminant or invalid codepoint), which cannot occur for an op produced by this crate's
    /// own constructors.
    pub fn apply(&mut self, op: &Op, temp: bool) -> Result<bool, Error> {
        let client = op.client;
        let seq = self.user_seq(client);
        let session = self.user_session(client);
        let kind = op.kind()?;
        let admit = op.seq == seq + 1 || (kind == OpKind::Init && op.session != session);
        if !admit {
            OPS_REJECTED.click();
            return Ok(false);
        }
        match kind {
            OpKind::Insert => self.apply_insert(client, op.data_char()?, temp),
            OpKind::Delete => self.apply_delete(client),
            OpKind::Newline => self.apply_newline(client),
            OpKind::Move => self.apply_move(client, op.direction()?),
            OpKind::Init => self.apply_init(client, op.session),
        }
        self.view += 1;
        self.set_user_seq(client, seq + 1);
        if kind == OpKind::Init {
            self.set_user_session(client, op.session);
        }
        OPS_APPLIED.click();
        Ok(true)
    }

    fn other_clients(&self, exclude: ClientId) -> Vec<ClientId> {
        self.user_pos
            .iter()
            .map(|e| e.client)
            .filter(|c| *c != exclude)
            .collect()
    }

    fn apply_insert(&mut self, client: ClientId, ch: char, temp: bool) {
        let mut p = self.user_pos(client);
        if p.y as usize == self.rows.len() {
            self.rows.push(Row::new());
        }
        let author = self.color(client).unwrap_or(0) as ClientId;
        self.rows[p.y as usize].insert(p.x as usize, ch, temp, author);
        for u in self.other_clients(client) {
            let mut up = self.user_pos(u);
            if up.y == p.y && up.x > p.x {
                up.x += 1;
                self.set_user_pos(u, up);
            }
        }
        p.x += 1;
        self.set_user_pos(client, p);
    }

    fn apply_newline(&mut self, client: ClientId) {
        let mut p = self.user_pos(client);
        if p.x == 0 {
            self.rows.insert(p.y as usize, Row::new());
        } else {
            let tail = self.rows[p.y as usize].split_off(p.x as usize);
            self.rows.insert(p.y as usize + 1, tail);
        }
        for u in self.other_clients(client) {
            let mut up = self.user_pos(u);
            if up.y == p.y && up.x >= p.x {
                up.y += 1;
                up.x -= p.x;
                self.set_user_pos(u, up);
            } else if up.y > p.y {
                up.y += 1;
                self.set_user_pos(u, up);
            }
        }
        p.y += 1;
        p.x = 0;
        self.set_user_pos(client, p);
    }

    fn apply_delete(&mut self, client: ClientId) {
        let mut p = self.user_pos(client);
        if p.x == 0 && p.y == 0 {
            return;
        }
        if p.x > 0 {
            self.rows[p.y as usize].remove(p.x as usize - 1);
            for u in self.other_clients(client) {
                let mut up = self.user_pos(u);
                if up.y == p.y && up.x >= p.x {
                    up.x -= 1;
                    self.set_user_pos(u, up);
                }
            }
            p.x -= 1;
        } else {
            let old = self.rows[p.y as usize - 1].len() as u32;
            let cur = self.rows.remove(p.y as usize);
            self.rows[p.y as usize - 1].append(cur);
            for u in self.other_clients(client) {
                let mut up = self.user_pos(u);
                if up.y == p.y {
                    up.x += old;
                    up.y -= 1;
                    self.set_user_pos(u, up);
                } else if up.y > p.y {
                    up.y -= 1;
                    self.set_user_pos(u, up);
                }
            }
            p.x = old;
            p.y -= 1;
        }
        self.set_user_pos(client, p);
    }

    fn apply_move(&mut self, client: ClientId, dir: Direction) {
        let mut p = self.user_pos(client);
        match dir {
            Direction::Left => {
                if p.x > 0 {
                    p.x -= 1;
                } else if p.y > 0 {
                    p.y -= 1;
                    p.x = self.rows[p.y as usize].len() as u32;
                }
            }
            Direction::Right => {
                if (p.x as usize) < self.rows[p.y as usize].len() {
                    p.x += 1;
                } else if (p.y as usize) + 1 < self.rows.len() {
                    p.y += 1;
                    p.x = 0;
                }
            }
            Direction::Up => {
                if p.y > 0 {
                    let rx = crate::render::cx_to_rx(&self.rows[p.y as usize], p.x as usize);
                    p.y -= 1;
                    let len = self.rows[p.y as usize].len();
                    p.x = crate::render::rx_to_cx(&self.rows[p.y as usize], rx).min(len) as u32;
                }
            }
            Direction::Down => {
                if (p.y as usize) + 1 < self.rows.len() {
                    let rx = crate::render::cx_to_rx(&self.rows[p.y as usize], p.x as usize);
                    p.y += 1;
                    let len = self.rows[p.y as usize].len();
                    p.x = crate::render::rx_to_cx(&self.rows[p.y as usize], rx).min(len) as u32;
                }
            }
            Direction::Home => {
                p.x = 0;
            }
            Direction::End => {
                p.x = self.rows[p.y as usize].len() as u32;
            }
        }
        self.set_user_pos(client, p);
    }

    fn apply_init(&mut self, client: ClientId, _session: SessionId) {
        if self.color(client).is_none() {
            let color = self.colors.len() as u32 + 1;
            self.colors.push(ColorEntry { client, color });
            self.known_clients.push(client);
        }
        self.set_user_pos(client, Pos::ORIGIN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buffertk::{stack_pack, Unpackable};

    fn init(doc: &mut Doc, client: ClientId, session: SessionId) {
        let seq = doc.user_seq(client) + 1;
        assert!(doc.apply(&Op::init(client, session, seq, doc.view), false).unwrap());
    }

    fn insert(doc: &mut Doc, client: ClientId, session: SessionId, ch: char) {
        let seq = doc.user_seq(client) + 1;
        assert!(doc
            .apply(&Op::insert(client, session, seq, doc.view, ch), false)
            .unwrap());
    }

    #[test]
    fn solo_insert_and_save_scenario() {
        let mut doc = Doc::empty();
        init(&mut doc, 1, 7);
        insert(&mut doc, 1, 7, 'H');
        insert(&mut doc, 1, 7, 'i');
        assert_eq!(doc.rows[0].text(), "Hi");
        assert_eq!(doc.user_pos(1), Pos::new(2, 0));
        assert_eq!(doc.view, 3);
    }

    #[test]
    fn concurrent_distinct_rows_scenario() {
        let mut doc = Doc::empty();
        doc.rows.push(Row::new());
        init(&mut doc, 1, 1);
        init(&mut doc, 2, 1);
        doc.set_user_pos(2, Pos::new(0, 1));
        insert(&mut doc, 1, 1, 'A');
        insert(&mut doc, 2, 1, 'B');
        assert_eq!(doc.rows[0].text(), "A");
        assert_eq!(doc.rows[1].text(), "B");
        assert_eq!(doc.user_pos(1), Pos::new(1, 0));
        assert_eq!(doc.user_pos(2), Pos::new(1, 1));
    }

    #[test]
    fn colliding_inserts_same_row_scenario() {
        let mut doc = Doc::empty();
        init(&mut doc, 1, 1);
        init(&mut doc, 2, 1);
        insert(&mut doc, 1, 1, 'X');
        insert(&mut doc, 2, 1, 'Y');
        assert_eq!(doc.rows[0].text(), "YX");
        assert_eq!(doc.user_pos(1), Pos::new(2, 0));
        assert_eq!(doc.user_pos(2), Pos::new(1, 0));
    }

    #[test]
    fn reversed_decision_order_yields_different_but_consistent_result() {
        // Same scenario as colliding_inserts_same_row_scenario, but C2's batch is decided
        // first. The outcome differs from the other order, which is fine -- total order, not
        // commutativity, is what convergence relies on.
        let mut doc = Doc::empty();
        init(&mut doc, 1, 1);
        init(&mut doc, 2, 1);
        insert(&mut doc, 2, 1, 'Y');
        insert(&mut doc, 1, 1, 'X');
        assert_eq!(doc.rows[0].text(), "XY");
        assert_eq!(doc.user_pos(2), Pos::new(2, 0));
        assert_eq!(doc.user_pos(1), Pos::new(1, 0));
    }

    #[test]
    fn determinism_two_replicas_same_log_same_state() {
        let ops_a = {
            let mut doc = Doc::empty();
            init(&mut doc, 1, 1);
            init(&mut doc, 2, 1);
            insert(&mut doc, 1, 1, 'X');
            insert(&mut doc, 2, 1, 'Y');
            doc
        };
        // A second replica receiving the identical committed log, replayed independently.
        let log = vec![
            Op::init(1, 1, 1, 0),
            Op::init(2, 1, 1, 1),
            Op::insert(1, 1, 2, 2, 'X'),
            Op::insert(2, 1, 2, 3, 'Y'),
        ];
        let mut replica_b = Doc::empty();
        for op in &log {
            replica_b.apply(op, false).unwrap();
        }
        assert_eq!(ops_a, replica_b);
    }

    #[test]
    fn newline_splits_row_scenario() {
        let mut doc = Doc::from_text("abcd");
        init(&mut doc, 1, 1);
        doc.set_user_pos(1, Pos::new(2, 0));
        let seq = doc.user_seq(1) + 1;
        assert!(doc.apply(&Op::newline(1, 1, seq, doc.view), false).unwrap());
        assert_eq!(doc.rows[0].text(), "ab");
        assert_eq!(doc.rows[1].text(), "cd");
        assert_eq!(doc.user_pos(1), Pos::new(0, 1));
    }

    #[test]
    fn delete_joins_rows_scenario() {
        let mut doc = Doc::from_text("ab\ncd");
        init(&mut doc, 1, 1);
        doc.set_user_pos(1, Pos::new(0, 1));
        let seq = doc.user_seq(1) + 1;
        assert!(doc.apply(&Op::delete(1, 1, seq, doc.view), false).unwrap());
        assert_eq!(doc.rows.len(), 1);
        assert_eq!(doc.rows[0].text(), "abcd");
        assert_eq!(doc.user_pos(1), Pos::new(2, 0));
    }

    #[test]
    fn delete_at_origin_is_noop() {
        let mut doc = Doc::empty();
        init(&mut doc, 1, 1);
        let seq = doc.user_seq(1) + 1;
        assert!(doc.apply(&Op::delete(1, 1, seq, doc.view), false).unwrap());
        assert_eq!(doc.rows[0].text(), "");
        assert_eq!(doc.user_pos(1), Pos::ORIGIN);
    }

    #[test]
    fn reconnect_mid_session_scenario() {
        let mut doc = Doc::empty();
        init(&mut doc, 1, 7);
        for _ in 0..4 {
            insert(&mut doc, 1, 7, 'x');
        }
        assert_eq!(doc.user_seq(1), 5);
        let palette_before = doc.color(1);

        // Client crashes and restarts with a new session; its next op is an Init carrying the
        // new session even though its prior seq would otherwise disqualify it.
        assert!(doc.apply(&Op::init(1, 8, 6, doc.view), false).unwrap());
        assert_eq!(doc.user_session(1), 8);
        assert_eq!(doc.user_seq(1), 6);
        assert_eq!(doc.color(1), palette_before);
    }

    #[test]
    fn duplicate_seq_is_rejected() {
        let mut doc = Doc::empty();
        init(&mut doc, 1, 1);
        insert(&mut doc, 1, 1, 'a');
        let stale = Op::insert(1, 1, 2, doc.view, 'b');
        assert!(!doc.apply(&stale, false).unwrap());
        assert_eq!(doc.rows[0].text(), "a");
    }

    #[test]
    fn snapshot_roundtrip() {
        let mut doc = Doc::from_text("ab\ncd");
        init(&mut doc, 1, 1);
        insert(&mut doc, 1, 1, 'z');
        let buf = stack_pack(&doc).to_vec();
        let got = Doc::unpack(&buf).unwrap().0;
        assert_eq!(doc, got);
    }

    #[test]
    fn row_array_parallelism_invariant() {
        let doc = Doc::from_text("hello\nworld");
        for row in &doc.rows {
            assert_eq!(row.len(), row.temp().len());
            assert_eq!(row.len(), row.author().len());
        }
    }

    #[test]
    fn palette_assigned_once_and_capped() {
        let mut doc = Doc::empty();
        for client in 1..=(MAXUSERS as ClientId) {
            init(&mut doc, client, 1);
        }
        let before: Vec<_> = (1..=(MAXUSERS as ClientId)).map(|c| doc.color(c)).collect();
        // Re-running Init with the same session is a no-op (session unchanged, seq not seq+1).
        for client in 1..=(MAXUSERS as ClientId) {
            let op = Op::init(client, 1, doc.user_seq(client) + 5, doc.view);
            doc.apply(&op, false).unwrap();
        }
        let after: Vec<_> = (1..=(MAXUSERS as ClientId)).map(|c| doc.color(c)).collect();
        assert_eq!(before, after);
        assert!(doc.colors.len() <= MAXUSERS);
    }
}
