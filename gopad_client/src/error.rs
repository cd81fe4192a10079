use prototk_derive::Message;
use zerror::{iotoz, Z};
use zerror_core::ErrorCore;

/// Errors raised by the client synchronizer and its terminal front end. RPC-level rejections
/// (`"High"`, `"Order"`, `"Full"`, ...) arrive as ordinary `Ok` replies from `gopad_server` and
/// are handled as retries, not propagated as `Error`; this type is reserved for failures that
/// have no such status string: terminal I/O, document corruption, and serialization failures.
#[derive(Clone, Message, zerror_derive::Z)]
pub enum Error {
    #[prototk(725504, message)]
    Success {
        #[prototk(1, message)]
        core: ErrorCore,
    },
    #[prototk(725505, message)]
    Document {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, message)]
        what: gopad_document::Error,
    },
    #[prototk(725506, message)]
    Server {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, message)]
        what: gopad_server::Error,
    },
    #[prototk(725507, message)]
    Terminal {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, string)]
        what: String,
    },
    #[prototk(725508, message)]
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

impl From<gopad_server::Error> for Error {
    fn from(what: gopad_server::Error) -> Self {
        Self::Server {
            core: ErrorCore::default(),
            what,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(what: std::io::Error) -> Self {
        Self::Terminal {
            core: ErrorCore::default(),
            what: what.to_string(),
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
