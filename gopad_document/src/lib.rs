#![doc = r#"
gopad_document implements the deterministic document mutation engine for gopad: the pure
`(Doc, Op) -> Doc'` state machine that every replica and every client must compute identically
for a given committed prefix.
"#]

mod doc;
mod error;
mod op;
pub mod render;
mod types;

pub use doc::{register_biometrics, Doc, MAXUSERS};
pub use error::Error;
pub use op::{Batch, Op};
pub use render::{cx_to_rx, render_row, rx_to_cx, TABSTOP};
pub use types::{
    ClientId, ColorEntry, Direction, OpKind, Pos, PosEntry, Row, SeqEntry, SessionEntry, SessionId,
};
