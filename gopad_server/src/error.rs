use prototk_derive::Message;
use zerror::{iotoz, Z};
use zerror_core::ErrorCore;

/// Errors raised by the replication server.  Most RPC-visible failures are NOT represented as
/// `Error` variants but as `status` strings in the reply types (`"High"`, `"Order"`, `"Full"`,
/// ...) because the original protocol treats them as ordinary, expected outcomes
/// rather than exceptional ones. `Error` is reserved for failures that cannot be expressed as a
/// status string: transport, serialization, and consensus-layer failures.
#[derive(Clone, Message, zerror_derive::Z)]
pub enum Error {
    #[prototk(692224, message)]
    Success {
        #[prototk(1, message)]
        core: ErrorCore,
    },
    #[prototk(692225, message)]
    Document {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, message)]
        what: gopad_document::Error,
    },
    #[prototk(692226, message)]
    Consensus {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, message)]
        what: gopad_paxos::Error,
    },
    #[prototk(692227, message)]
    Rpc {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, message)]
        what: rpc_pb::Error,
    },
    #[prototk(692228, message)]
    Serialization {
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

impl From<gopad_document::Error> for Error {
    fn from(what: gopad_document::Error) -> Self {
        Self::Document {
            core: ErrorCore::default(),
            what,
        }
    }
}

impl From<gopad_paxos::Error> for Error {
    fn from(what: gopad_paxos::Error) -> Self {
        Self::Consensus {
            core: ErrorCore::default(),
            what,
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
