use prototk_derive::Message;
use zerror::{iotoz, Z};
use zerror_core::ErrorCore;

/// Errors raised while manipulating a [crate::Doc].
///
/// These are programming errors, not policy errors: the admission gate in [crate::Doc::apply]
/// is supposed to make every precondition below unreachable in a correctly wired server or
/// client.  If one fires, the caller skipped the gate.
#[derive(Clone, Message, zerror_derive::Z)]
pub enum Error {
    #[prototk(663360, message)]
    Success {
        #[prototk(1, message)]
        core: ErrorCore,
    },
    /// A client's cursor pointed outside the document.
    #[prototk(663361, message)]
    CursorOutOfBounds {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, int32)]
        client: i32,
    },
    /// An op carried a `kind`/`dir` discriminant this build doesn't understand.
    #[prototk(663362, message)]
    UnknownDiscriminant {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint32)]
        value: u32,
    },
    /// An op's `data` field did not decode to a Unicode scalar value.
    #[prototk(663363, message)]
    InvalidCodepoint {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint32)]
        value: u32,
    },
    /// A snapshot failed to decode.
    #[prototk(663364, message)]
    SerializationError {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, string)]
        what: String,
    },
}

impl Default for Error {
    fn default() -> Self {
        Self::Success {
            core: ErrorCore::default(),
        }
    }
}

impl From<prototk::Error> for Error {
    fn from(what: prototk::Error) -> Self {
        Self::SerializationError {
            core: ErrorCore::default(),
            what: format!("{:?}", what),
        }
    }
}

impl From<buffertk::Error> for Error {
    fn from(what: buffertk::Error) -> Self {
        Self::SerializationError {
            core: ErrorCore::default(),
            what: format!("{:?}", what),
        }
    }
}

iotoz! {Error}
