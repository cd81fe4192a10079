use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use biometrics::Counter;
use buffertk::Unpackable;
use gopad_document::{ClientId, Doc, SessionId};
use gopad_server::{server_client, HandleRequest, InitRequest, QueryRequest, ServerClient, ServerService};
use gopad_transport::DialClient;
use indicio::{clue, INFO};
use rpc_pb::Context;

use crate::error::Error;
use crate::state::ClientState;

static PUSH_TICKS: Counter = Counter::new("gopad_client.push.ticks");
static PUSH_RETRIES: Counter = Counter::new("gopad_client.push.retries");
static PULL_TICKS: Counter = Counter::new("gopad_client.pull.ticks");
static PULL_OPS_APPLIED: Counter = Counter::new("gopad_client.pull.ops_applied");
static BOOTSTRAP_RETRIES: Counter = Counter::new("gopad_client.bootstrap.retries");

pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&PUSH_TICKS);
    collector.register_counter(&PUSH_RETRIES);
    collector.register_counter(&PULL_TICKS);
    collector.register_counter(&PULL_OPS_APPLIED);
    collector.register_counter(&BOOTSTRAP_RETRIES);
}

pub static LOGGING: indicio::Collector = indicio::Collector::new();

/// How often the push loop flushes `self_ops` (`pushDelay` in `client.go`).
pub const DEFAULT_PUSH_DELAY: Duration = Duration::from_millis(250);
/// How often the pull loop asks for new commits (`pullDelay` in `client.go`).
pub const DEFAULT_PULL_DELAY: Duration = Duration::from_millis(250);
/// Backoff between `Init` retries while the cluster is still admitting a new client (`Full`).
const INIT_FULL_RETRY: Duration = Duration::from_secs(1);

/// Ties one client's state to the server connection that keeps it in sync.
///
/// Grounded on `client.go`'s `gopad` struct plus its `push`/`pull`/`editorOpen` methods; the TCP
/// dial-per-call transport comes from [gopad_transport::DialClient] rather than the original's
/// `net/rpc` client.
pub struct Client {
    pub state: Arc<Mutex<ClientState>>,
    server: ServerClient,
    push_delay: Duration,
    pull_delay: Duration,
    xid: AtomicU64,
}

impl Client {
    fn fresh_xid(&self) -> u64 {
        self.xid.fetch_add(1, Ordering::Relaxed)
    }

    /// Dial `addr` and run the Init bootstrap: call `Init` until admitted, decode the returned
    /// snapshot, then poll `Query` until this client's own decided Init op is visible and
    /// applied. Only after that does normal push/pull operation begin.
    pub fn bootstrap(
        me: ClientId,
        session: SessionId,
        addr: &str,
        filename: Option<String>,
        push_delay: Duration,
        pull_delay: Duration,
    ) -> Result<Arc<Self>, Error> {
        let dial: Arc<dyn rpc_pb::Client + Send + Sync + 'static> =
            Arc::new(DialClient::new(addr));
        let server = server_client(dial);
        let ctx = Context::default();

        let doc = loop {
            match server.init(&ctx, InitRequest { client: me, session }) {
                Ok(reply) if reply.err == "OK" => {
                    let (doc, _): (Doc, _) = Doc::unpack(&reply.doc)?;
                    break doc;
                }
                Ok(_) => {
                    BOOTSTRAP_RETRIES.click();
                    std::thread::sleep(INIT_FULL_RETRY);
                }
                Err(_) => {
                    BOOTSTRAP_RETRIES.click();
                    std::thread::sleep(INIT_FULL_RETRY);
                }
            }
        };

        let state = Arc::new(Mutex::new(ClientState::new(me, session, doc, filename)));

        loop {
            let view = state.lock().unwrap().committed_doc.view;
            match server.query(&ctx, QueryRequest { view, client: me }) {
                Ok(reply) if reply.err == "OK" && !reply.ops.is_empty() => {
                    let mut guard = state.lock().unwrap();
                    if guard.apply_commits(&reply.ops)? {
                        break;
                    }
                }
                _ => std::thread::sleep(pull_delay),
            }
        }
        state.lock().unwrap().resync_op_num();

        clue!(LOGGING, INFO, { bootstrapped: { client: me } });
        Ok(Arc::new(Self {
            state,
            server,
            push_delay,
            pull_delay,
            xid: AtomicU64::new(0),
        }))
    }

    /// Spawn the background push and pull threads. Returns their join handles for the caller to
    /// detach or track; both loops run forever.
    pub fn spawn_background(self: &Arc<Self>) -> (std::thread::JoinHandle<()>, std::thread::JoinHandle<()>) {
        let push_self = Arc::clone(self);
        let push = std::thread::spawn(move || push_self.run_push_loop());
        let pull_self = Arc::clone(self);
        let pull = std::thread::spawn(move || pull_self.run_pull_loop());
        (push, pull)
    }

    fn run_push_loop(&self) {
        let ctx = Context::default();
        loop {
            PUSH_TICKS.click();
            let ops = self.state.lock().unwrap().self_ops.clone();
            if ops.is_empty() {
                std::thread::sleep(self.push_delay);
                continue;
            }
            let xid = self.fresh_xid();
            loop {
                match self.server.handle(&ctx, HandleRequest { ops: ops.clone(), xid }) {
                    Ok(reply) if reply.err == "OK" => break,
                    _ => {
                        PUSH_RETRIES.click();
                    }
                }
            }
            std::thread::sleep(self.push_delay);
        }
    }

    fn run_pull_loop(&self) {
        let ctx = Context::default();
        loop {
            PULL_TICKS.click();
            let (view, client) = {
                let guard = self.state.lock().unwrap();
                (guard.committed_doc.view, guard.me)
            };
            match self.server.query(&ctx, QueryRequest { view, client }) {
                Ok(reply) if reply.err == "OK" && !reply.ops.is_empty() => {
                    PULL_OPS_APPLIED.click();
                    let mut guard = self.state.lock().unwrap();
                    let _ = guard.apply_commits(&reply.ops);
                }
                _ => std::thread::sleep(self.pull_delay),
            }
        }
    }
}
