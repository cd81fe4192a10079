use std::collections::HashMap;

/// Maps servers by name for dispatch.  `rpc_pb::ServerRegistry` exists but exposes no public
/// constructor; this mirrors `busyrpc::server::ServiceRegistry`'s duplicate of the same idea.
pub struct ServiceRegistry {
    services: HashMap<&'static str, Box<dyn rpc_pb::Server + Send + Sync + 'static>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    pub fn register<S: rpc_pb::Server + Send + Sync + 'static>(
        &mut self,
        name: &'static str,
        server: S,
    ) {
        if self.services.contains_key(name) {
            panic!("cannot add the same service twice");
        }
        self.services.insert(name, Box::new(server));
    }

    pub fn get_server(&self, name: &str) -> Option<&(dyn rpc_pb::Server + Send + Sync + 'static)> {
        self.services.get(name).map(|x| x.as_ref())
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
