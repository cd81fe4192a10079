#![doc = r#"
gopad_transport is the plain-TCP, blocking RPC transport gopad's server and client processes
dial each other over.  It exists because `busyrpc` is built around boring-SSL and an
epoll-driven non-blocking event loop that gopad's spec explicitly puts out of scope (no TLS,
no dynamic connection pooling); this crate keeps `rpc_pb`'s wire types and service-dispatch
traits but replaces the transport underneath with a thread-per-connection blocking model.
"#]

mod client;
mod frame;
mod registry;
mod server;

pub use client::DialClient;
pub use registry::ServiceRegistry;
pub use server::Server;

pub static LOGGING: indicio::Collector = indicio::Collector::new();

/// Register the biometrics for this crate.
pub fn register_biometrics(collector: &biometrics::Collector) {
    client::register_biometrics(collector);
    server::register_biometrics(collector);
}
