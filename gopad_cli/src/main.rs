//! `gopad` is the editor binary: with `--client` it runs the terminal front end against a
//! running replica group; without it, it runs this process as one replica of that group.
//!
//! Grounded on `examples/original_source/src/main.go`'s dispatch between `StartServer` and
//! `StartClient`, and on `busyrpc-benchmark-client`/`busyrpc-benchmark-server`'s CLI + biometrics
//! reporter shape.

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;

use biometrics::{Collector, PlainTextEmitter};
use indicio::{clue, INFO};

use gopad_document::Doc;
use gopad_paxos::{
    AcceptReply, AcceptRequest, DecidedReply, DecidedRequest, Paxos, PaxosClient, PaxosServer,
    PaxosService, PrepareReply, PrepareRequest, ReplyDoneReply, ReplyDoneRequest,
};
use gopad_server::{Server, ServerServer, ServerService};
use gopad_transport::{DialClient, ServiceRegistry};
use rpc_pb::Context;

pub static LOGGING: indicio::Collector = indicio::Collector::new();

#[derive(Clone, Debug, Eq, PartialEq, CommandLine)]
struct GopadOptions {
    #[arrrg(optional, "Client ID; presence runs gopad as a client instead of a replica.")]
    client: Option<i32>,
    #[arrrg(optional, "Host to dial as a client.")]
    server_host: String,
    #[arrrg(optional, "Port to dial (client) or bind (replica).")]
    port: u16,
    #[arrrg(optional, "This replica's index into --peers.")]
    replica: usize,
    #[arrrg(flag, "Recover this replica's state from a live peer instead of starting fresh.")]
    reboot: bool,
    #[arrrg(optional, "Comma-separated host:port of every replica, this one included.")]
    peers: String,
    #[arrrg(optional, "Milliseconds between a client flushing pending ops to the server.")]
    push_delay_ms: u64,
    #[arrrg(optional, "Milliseconds between a client polling the server for new ops.")]
    pull_delay_ms: u64,
    #[arrrg(optional, "Milliseconds between a replica folding decided slots into its document.")]
    update_delay_ms: u64,
}

impl Default for GopadOptions {
    fn default() -> Self {
        Self {
            client: None,
            server_host: "127.0.0.1".to_string(),
            port: 6060,
            replica: 0,
            reboot: false,
            peers: "127.0.0.1:6060".to_string(),
            push_delay_ms: 250,
            pull_delay_ms: 250,
            update_delay_ms: 250,
        }
    }
}

fn spawn_biometrics_reporter() {
    std::thread::spawn(|| {
        let mut collector = Collector::new();
        gopad_document::register_biometrics(&collector);
        gopad_paxos::register_biometrics(&collector);
        gopad_server::register_biometrics(&collector);
        gopad_transport::register_biometrics(&collector);
        gopad_client::register_biometrics(&collector);
        let fout = match File::create("/dev/stdout") {
            Ok(fout) => fout,
            Err(_) => return,
        };
        let mut emit = PlainTextEmitter::new(fout);
        loop {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            let _ = collector.emit(&mut emit, now);
            std::thread::sleep(Duration::from_millis(249));
        }
    });
}

/// Stands in for this replica's own slot in a peer list: [Paxos]/[Server] never dial `peers[me]`,
/// routing calls for their own index directly to the in-process handler instead.
struct SelfPlaceholder;

impl PaxosService for SelfPlaceholder {
    fn prepare(&self, _ctx: &Context, _req: PrepareRequest) -> Result<PrepareReply, gopad_paxos::Error> {
        panic!("a replica's own paxos slot is never dialed");
    }
    fn accept(&self, _ctx: &Context, _req: AcceptRequest) -> Result<AcceptReply, gopad_paxos::Error> {
        panic!("a replica's own paxos slot is never dialed");
    }
    fn decided(&self, _ctx: &Context, _req: DecidedRequest) -> Result<DecidedReply, gopad_paxos::Error> {
        panic!("a replica's own paxos slot is never dialed");
    }
    fn reply_done(&self, _ctx: &Context, _req: ReplyDoneRequest) -> Result<ReplyDoneReply, gopad_paxos::Error> {
        panic!("a replica's own paxos slot is never dialed");
    }
}

impl ServerService for SelfPlaceholder {
    fn init(&self, _ctx: &Context, _req: gopad_server::InitRequest) -> Result<gopad_server::InitReply, gopad_server::Error> {
        panic!("a replica never dials itself for recovery");
    }
    fn handle(&self, _ctx: &Context, _req: gopad_server::HandleRequest) -> Result<gopad_server::HandleReply, gopad_server::Error> {
        panic!("a replica never dials itself for recovery");
    }
    fn query(&self, _ctx: &Context, _req: gopad_server::QueryRequest) -> Result<gopad_server::QueryReply, gopad_server::Error> {
        panic!("a replica never dials itself for recovery");
    }
    fn copy(&self, _ctx: &Context, _req: gopad_server::CopyRequest) -> Result<gopad_server::CopyReply, gopad_server::Error> {
        panic!("a replica never dials itself for recovery");
    }
}

fn run_replica(options: GopadOptions, file: Option<String>) {
    let addrs: Vec<String> = options.peers.split(',').map(|s| s.trim().to_string()).collect();
    if options.replica >= addrs.len() {
        eprintln!("--replica is out of range of --peers");
        std::process::exit(1);
    }
    let bind_to = addrs[options.replica].clone();
    let update_delay = Duration::from_millis(options.update_delay_ms);

    let paxos_peers: Vec<Arc<dyn PaxosService>> = addrs
        .iter()
        .enumerate()
        .map(|(i, addr)| -> Arc<dyn PaxosService> {
            if i == options.replica {
                Arc::new(SelfPlaceholder)
            } else {
                let dial: Arc<dyn rpc_pb::Client + Send + Sync + 'static> =
                    Arc::new(DialClient::new(addr.clone()));
                Arc::new(PaxosClient::new(dial))
            }
        })
        .collect();
    let paxos = Arc::new(Paxos::new(options.replica, paxos_peers));

    let server_peers: Vec<Arc<dyn ServerService>> = addrs
        .iter()
        .enumerate()
        .map(|(i, addr)| -> Arc<dyn ServerService> {
            if i == options.replica {
                Arc::new(SelfPlaceholder)
            } else {
                let dial: Arc<dyn rpc_pb::Client + Send + Sync + 'static> =
                    Arc::new(DialClient::new(addr.clone()));
                Arc::new(gopad_server::server_client(dial))
            }
        })
        .collect();

    let server = if options.reboot {
        Server::new_recovering(options.replica, Arc::clone(&paxos), server_peers)
    } else {
        let doc = match &file {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(text) => Doc::from_text(&text),
                Err(err) => {
                    eprintln!("could not read {path}: {err}");
                    std::process::exit(1);
                }
            },
            None => Doc::empty(),
        };
        Server::new(options.replica, doc, Arc::clone(&paxos), server_peers)
    };

    let mut registry = ServiceRegistry::new();
    registry.register("PaxosService", PaxosServer::bind(Arc::clone(&paxos)));
    registry.register("ServerService", ServerServer::bind(Arc::clone(&server)));

    let transport = match gopad_transport::Server::bind(&bind_to, registry) {
        Ok(transport) => transport,
        Err(err) => {
            eprintln!("could not bind {bind_to}: {err:?}");
            std::process::exit(1);
        }
    };

    let serve_handle = {
        let transport = Arc::new(transport);
        let transport_for_thread = Arc::clone(&transport);
        std::thread::spawn(move || {
            let _ = transport_for_thread.serve();
        })
    };

    {
        let server = Arc::clone(&server);
        std::thread::spawn(move || server.run_commit_applier(update_delay));
    }

    if options.reboot {
        let server = Arc::clone(&server);
        server.recover(update_delay);
        clue!(LOGGING, INFO, { recovered: { replica: options.replica } });
    }

    clue!(LOGGING, INFO, { listening: { addr: bind_to.clone() } });
    let _ = serve_handle.join();
}

fn run_client(options: GopadOptions, file: Option<String>) {
    let Some(client) = options.client else {
        unreachable!("run_client is only called once options.client is Some");
    };
    let session = gopad_client::random_session();
    let addr = format!("{}:{}", options.server_host, options.port);
    let push_delay = Duration::from_millis(options.push_delay_ms);
    let pull_delay = Duration::from_millis(options.pull_delay_ms);
    if let Err(err) = gopad_client::run(client, session, &addr, file, push_delay, pull_delay) {
        eprintln!("gopad client exited: {err:?}");
        std::process::exit(1);
    }
}

fn main() {
    let (options, free) = GopadOptions::from_command_line_relaxed("Usage: gopad [FILE] [OPTIONS]");
    if free.len() > 1 {
        eprintln!("gopad takes at most one positional argument (the file to open)");
        std::process::exit(1);
    }
    let file = free.into_iter().next();

    spawn_biometrics_reporter();

    match options.client {
        Some(_) => run_client(options, file),
        None => run_replica(options, file),
    }
}
