#![doc = r#"
gopad_client is the optimistic editor client: it keeps a `committed_doc` proven by decided,
applied ops and a `tentative_doc` that layers the client's own not-yet-committed edits on top for
immediate local feedback, pushes batches of new ops to the replication server, pulls decided ops
back to rebase, and renders the result to a terminal. Grounded on
`examples/original_source/src/client.go`.
"#]

mod error;
mod palette;
mod state;
mod sync;
mod ui;

use std::sync::Arc;
use std::time::Duration;

use gopad_document::{ClientId, SessionId};

pub use error::Error;
pub use state::ClientState;
pub use sync::{Client, DEFAULT_PULL_DELAY, DEFAULT_PUSH_DELAY};

pub fn register_biometrics(collector: &biometrics::Collector) {
    sync::register_biometrics(collector);
}

/// Mint a per-process session token the way `client.go`'s `StartClient` does
/// (`rand.Uint32()`), seeded from wall-clock time since this is a one-shot token with no need
/// to be reproducible.
pub fn random_session() -> SessionId {
    use guacamole::{FromGuacamole, Guacamole};
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        ^ (std::process::id() as u64);
    let mut rng = Guacamole::new(seed);
    u32::from_guacamole(&mut (), &mut rng)
}

/// Connect to `addr`, run the Init bootstrap, spawn the push/pull background threads, and run
/// the terminal front end until the user quits. This is gopad_client's whole public surface for
/// the CLI binary to drive.
pub fn run(
    me: ClientId,
    session: SessionId,
    addr: &str,
    filename: Option<String>,
    push_delay: Duration,
    pull_delay: Duration,
) -> Result<(), Error> {
    let client = Client::bootstrap(me, session, addr, filename, push_delay, pull_delay)?;
    let _threads = client.spawn_background();
    ui::run(Arc::clone(&client))
}
