use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};

use biometrics::Counter;
use buffertk::{stack_pack, Unpackable};
use rpc_pb::{Context, Error, Request, Response, Status};
use zerror_core::ErrorCore;

use crate::frame::{read_message, write_message};

static CALLS: Counter = Counter::new("gopad_transport.client.calls");
static DIAL_FAILED: Counter = Counter::new("gopad_transport.client.dial_failed");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&CALLS);
    collector.register_counter(&DIAL_FAILED);
}

/// An `rpc_pb::Client` that dials a fresh TCP connection for every call.
///
/// Grounded on `common.go`'s `call(srv, rpcname, args, reply)`, which dials, issues exactly one
/// RPC, and closes the connection; this workspace has no persistent connection pool like
/// `busyrpc::client`'s multiplexed channels, because gopad's RPC volume (one batch decision per
/// edit, one heartbeat per done-seq gossip) does not warrant it.
pub struct DialClient {
    addr: String,
    seq_no: AtomicU64,
}

impl DialClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            seq_no: AtomicU64::new(0),
        }
    }
}

impl rpc_pb::Client for DialClient {
    fn call(&self, ctx: &Context, server: &str, method: &str, req: &[u8]) -> Status {
        CALLS.click();
        let mut stream = match TcpStream::connect(&self.addr) {
            Ok(stream) => stream,
            Err(err) => {
                DIAL_FAILED.click();
                return Err(Error::TransportFailure {
                    core: ErrorCore::default(),
                    what: err.to_string(),
                });
            }
        };
        let _ = stream.set_nodelay(true);
        let seq_no = self.seq_no.fetch_add(1, Ordering::Relaxed);
        let request = Request {
            service: server,
            method,
            seq_no,
            body: req,
            caller: ctx.clients(),
            trace: ctx.trace_id(),
        };
        let req_buf = stack_pack(request).to_vec();
        write_message(&mut stream, &req_buf)?;
        let resp_buf = read_message(&mut stream)?;
        let (resp, _): (Response, _) = Response::unpack(&resp_buf)?;
        if let Some(rpc_error) = resp.rpc_error {
            let (err, _): (Error, _) = Error::unpack(rpc_error)?;
            return Err(err);
        }
        if let Some(service_error) = resp.service_error {
            return Ok(Err(service_error.to_vec()));
        }
        Ok(Ok(resp.body.unwrap_or(&[]).to_vec()))
    }
}
