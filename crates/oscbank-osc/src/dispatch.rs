//! Address to handler dispatch table

use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::packet::{OscMessage, OscType};

/// Handler invoked with `(address, channel, args)`
pub type Handler = Arc<dyn Fn(&str, usize, &[OscType]) + Send + Sync>;

struct Route {
    channel: usize,
    handler: Handler,
}

/// Exact-match dispatch table. Only mapped addresses are ever routed.
#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<String, Route>,
    order: Vec<String>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an address to a handler. Returns false if the address was already mapped.
    pub fn map(&mut self, address: impl Into<String>, channel: usize, handler: Handler) -> bool {
        let address = address.into();
        if self.routes.contains_key(&address) {
            return false;
        }
        self.order.push(address.clone());
        self.routes.insert(address, Route { channel, handler });
        true
    }

    /// Mapped addresses in registration order
    pub fn addresses(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route a message. Returns false when no handler is mapped for its address.
    pub fn dispatch(&self, msg: &OscMessage) -> bool {
        match self.routes.get(&msg.addr) {
            Some(route) => {
                (route.handler)(&msg.addr, route.channel, &msg.args);
                true
            }
            None => {
                trace!(address = %msg.addr, "No handler mapped");
                false
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("addresses", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_dispatch_exact_match_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let sink = seen.clone();
        let handler: Handler = Arc::new(move |addr: &str, channel: usize, args: &[OscType]| {
            sink.lock().unwrap().push((addr.to_string(), channel, args.to_vec()));
        });

        assert!(dispatcher.map("/phidget1012/5", 5, handler.clone()));
        assert!(!dispatcher.map("/phidget1012/5", 6, handler));

        assert!(dispatcher.dispatch(&OscMessage::new("/phidget1012/5", vec![OscType::Int(1)])));
        assert!(!dispatcher.dispatch(&OscMessage::new("/999/5", vec![OscType::Int(1)])));
        assert!(!dispatcher.dispatch(&OscMessage::new("/phidget1012/5/", vec![])));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], ("/phidget1012/5".to_string(), 5, vec![OscType::Int(1)]));
    }
}
