use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use biometrics::Counter;
use buffertk::{stack_pack, Unpackable};
use indicio::{clue, INFO};
use rpc_pb::{Context, Error, Request, Status};
use zerror_core::ErrorCore;

use crate::frame::{read_message, write_message};
use crate::registry::ServiceRegistry;
use crate::LOGGING;

static ACCEPTED: Counter = Counter::new("gopad_transport.server.accepted");
static CONNECTION_CLOSED: Counter = Counter::new("gopad_transport.server.connection_closed");
static REQUEST_HANDLED: Counter = Counter::new("gopad_transport.server.request_handled");
static UNKNOWN_SERVICE: Counter = Counter::new("gopad_transport.server.unknown_service");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&ACCEPTED);
    collector.register_counter(&CONNECTION_CLOSED);
    collector.register_counter(&REQUEST_HANDLED);
    collector.register_counter(&UNKNOWN_SERVICE);
}

/// A plain-TCP RPC server: one listener, one thread per accepted connection, each connection
/// served until the peer disconnects or a framing error occurs.
///
/// Grounded on `server.go`'s `Start()`, which does `net.Listen` followed by
/// `go rpcs.ServeConn(conn)` per accepted connection, and on `busyrpc::server::Server` minus
/// TLS and the epoll-driven event loop (this workspace's ambient transport complexity that the
/// spec's non-goals explicitly waive).
pub struct Server {
    listener: TcpListener,
    registry: Arc<ServiceRegistry>,
}

impl Server {
    pub fn bind(bind_to: &str, registry: ServiceRegistry) -> Result<Self, Error> {
        let listener = TcpListener::bind(bind_to).map_err(|err| Error::TransportFailure {
            core: ErrorCore::default(),
            what: err.to_string(),
        })?;
        Ok(Self {
            listener,
            registry: Arc::new(registry),
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, Error> {
        self.listener.local_addr().map_err(|err| Error::TransportFailure {
            core: ErrorCore::default(),
            what: err.to_string(),
        })
    }

    /// Accept connections forever, spawning a thread per connection.  Never returns except on a
    /// listener error.
    pub fn serve(&self) -> Result<(), Error> {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    clue!(LOGGING, INFO, {
                        accept_error: {
                            what: err.to_string(),
                        },
                    });
                    continue;
                }
            };
            ACCEPTED.click();
            let registry = Arc::clone(&self.registry);
            std::thread::spawn(move || {
                serve_connection(stream, &registry);
            });
        }
        Ok(())
    }
}

fn serve_connection(mut stream: TcpStream, registry: &ServiceRegistry) {
    let _ = stream.set_nodelay(true);
    loop {
        let msg = match read_message(&mut stream) {
            Ok(msg) => msg,
            Err(_) => {
                CONNECTION_CLOSED.click();
                return;
            }
        };
        let resp_buf = match handle_one(registry, &msg) {
            Ok(buf) => buf,
            Err(_) => {
                CONNECTION_CLOSED.click();
                return;
            }
        };
        if write_message(&mut stream, &resp_buf).is_err() {
            CONNECTION_CLOSED.click();
            return;
        }
    }
}

fn handle_one(registry: &ServiceRegistry, msg: &[u8]) -> Result<Vec<u8>, Error> {
    let req = Request::unpack(msg)?.0;
    let ctx = Context::from(&req);
    let status: Status = match registry.get_server(req.service) {
        Some(server) => {
            REQUEST_HANDLED.click();
            server.call(&ctx, req.method, req.body)
        }
        None => {
            UNKNOWN_SERVICE.click();
            Err(Error::UnknownServerName {
                core: ErrorCore::default(),
                name: req.service.to_string(),
            })
        }
    };
    let (body, service_error, rpc_error): (Option<&[u8]>, Option<&[u8]>, Option<Vec<u8>>) =
        match &status {
            Ok(Ok(body)) => (Some(body.as_slice()), None, None),
            Ok(Err(err)) => (None, Some(err.as_slice()), None),
            Err(err) => (None, None, Some(stack_pack(err).to_vec())),
        };
    let resp = rpc_pb::Response {
        seq_no: req.seq_no,
        trace: req.trace,
        body,
        service_error,
        rpc_error: rpc_error.as_deref(),
    };
    Ok(stack_pack(resp).to_vec())
}
