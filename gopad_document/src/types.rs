use prototk_derive::Message;

use crate::error::Error;

/// A client identifier, provided on the command line and never reassigned.
pub type ClientId = i32;
/// A session token minted once per client process.
pub type SessionId = u32;

/////////////////////////////////////////////// Pos ////////////////////////////////////////////////

/// A cursor position in canonical document coordinates.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Message)]
pub struct Pos {
    #[prototk(1, uint32)]
    pub x: u32,
    #[prototk(2, uint32)]
    pub y: u32,
}

impl Pos {
    pub const ORIGIN: Pos = Pos { x: 0, y: 0 };

    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

////////////////////////////////////////////// OpKind //////////////////////////////////////////////

/// The discriminant carried by [crate::Op]'s `kind` field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpKind {
    Insert = 0,
    Delete = 1,
    Newline = 2,
    Init = 3,
    Move = 4,
}

impl TryFrom<u32> for OpKind {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(OpKind::Insert),
            1 => Ok(OpKind::Delete),
            2 => Ok(OpKind::Newline),
            3 => Ok(OpKind::Init),
            4 => Ok(OpKind::Move),
            _ => Err(Error::UnknownDiscriminant {
                core: Default::default(),
                value,
            }),
        }
    }
}

impl From<OpKind> for u32 {
    fn from(kind: OpKind) -> u32 {
        kind as u32
    }
}

///////////////////////////////////////////// Direction ////////////////////////////////////////////

/// The discriminant carried by [crate::Op]'s `dir` field when `kind == OpKind::Move`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Left = 0,
    Right = 1,
    Up = 2,
    Down = 3,
    Home = 4,
    End = 5,
}

impl TryFrom<u32> for Direction {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(Direction::Left),
            1 => Ok(Direction::Right),
            2 => Ok(Direction::Up),
            3 => Ok(Direction::Down),
            4 => Ok(Direction::Home),
            5 => Ok(Direction::End),
            _ => Err(Error::UnknownDiscriminant {
                core: Default::default(),
                value,
            }),
        }
    }
}

impl From<Direction> for u32 {
    fn from(dir: Direction) -> u32 {
        dir as u32
    }
}

///////////////////////////////////////////////// Row //////////////////////////////////////////////

/// A single line of the document.
///
/// `chars`, `temp`, and `author` are always the same length, counted in Unicode scalar values,
/// never bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Message)]
pub struct Row {
    #[prototk(1, string)]
    chars: String,
    #[prototk(2, uint32)]
    temp: Vec<u32>,
    #[prototk(3, int32)]
    author: Vec<ClientId>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_str(s: &str) -> Self {
        let len = s.chars().count();
        Self {
            chars: s.to_string(),
            temp: vec![0; len],
            author: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.chars.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn chars_vec(&self) -> Vec<char> {
        self.chars.chars().collect()
    }

    pub fn temp(&self) -> Vec<bool> {
        self.temp.iter().map(|t| *t != 0).collect()
    }

    pub fn author(&self) -> &[ClientId] {
        &self.author
    }

    pub fn text(&self) -> &str {
        &self.chars
    }

    /// Splice `ch` into this row at char index `at`.
    pub fn insert(&mut self, at: usize, ch: char, temp: bool, author: ClientId) {
        let mut chars = self.chars_vec();
        chars.insert(at, ch);
        self.chars = chars.into_iter().collect();
        self.temp.insert(at, if temp { 1 } else { 0 });
        self.author.insert(at, author);
    }

    /// Remove the char at index `at`.
    pub fn remove(&mut self, at: usize) {
        let mut chars = self.chars_vec();
        chars.remove(at);
        self.chars = chars.into_iter().collect();
        self.temp.remove(at);
        self.author.remove(at);
    }

    /// Split this row at char index `at`, returning the tail as a new row.
    pub fn split_off(&mut self, at: usize) -> Row {
        let mut chars = self.chars_vec();
        let tail_chars: String = chars.split_off(at).into_iter().collect();
        self.chars = chars.into_iter().collect();
        let tail_temp = self.temp.split_off(at);
        let tail_author = self.author.split_off(at);
        Row {
            chars: tail_chars,
            temp: tail_temp,
            author: tail_author,
        }
    }

    /// Append `other`'s contents onto the end of this row.
    pub fn append(&mut self, mut other: Row) {
        let mut chars = self.chars_vec();
        chars.append(&mut other.chars_vec());
        self.chars = chars.into_iter().collect();
        self.temp.append(&mut other.temp);
        self.author.append(&mut other.author);
    }
}

/////////////////////////////////////////////// Entries ////////////////////////////////////////////

// prototk has no native map type, so every per-client map here is carried as a Vec<Entry> of
// one of these, following the association-list idiom used elsewhere for repeated key/value
// pairs.

#[derive(Clone, Debug, Default, Eq, PartialEq, Message)]
pub struct PosEntry {
    #[prototk(1, int32)]
    pub client: ClientId,
    #[prototk(2, message)]
    pub pos: Pos,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Message)]
pub struct SeqEntry {
    #[prototk(1, int32)]
    pub client: ClientId,
    #[prototk(2, uint32)]
    pub seq: u32,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Message)]
pub struct SessionEntry {
    #[prototk(1, int32)]
    pub client: ClientId,
    #[prototk(2, uint32)]
    pub session: SessionId,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Message)]
pub struct ColorEntry {
    #[prototk(1, int32)]
    pub client: ClientId,
    #[prototk(2, uint32)]
    pub color: u32,
}
