use prototk_derive::Message;
use zerror::{iotoz, Z};
use zerror_core::ErrorCore;

/// Errors raised by the consensus core.
#[derive(Clone, Message, zerror_derive::Z)]
pub enum Error {
    #[prototk(679936, message)]
    Success {
        #[prototk(1, message)]
        core: ErrorCore,
    },
    #[prototk(679937, message)]
    Rpc {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, message)]
        what: rpc_pb::Error,
    },
    #[prototk(679938, message)]
    Serialization {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, string)]
        what: String,
    },
    /// This replica does not recognize the requested peer index.
    #[prototk(679939, message)]
    UnknownPeer {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint64)]
        peer: u64,
    },
}

impl Default for Error {
    fn default() -> Self {
        Self::Success {
            core: ErrorCore::default(),
        }
    }
}

impl From<rpc_pb::Error> for Error {
    fn from(what: rpc_pb::Error) -> Self {
        Self::Rpc {
            core: ErrorCore::default(),
            what,
        }
    }
}

impl From<prototk::Error> for Error {
    fn from(what: prototk::Error) -> Self {
        Self::Serialization {
            core: ErrorCore::default(),
            what: format!("{:?}", what),
        }
    }
}

impl From<buffertk::Error> for Error {
    fn from(what: buffertk::Error) -> Self {
        Self::Serialization {
            core: ErrorCore::default(),
            what: format!("{:?}", what),
        }
    }
}

iotoz! {Error}
