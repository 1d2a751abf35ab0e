//! Common test utilities and recording subscribers.

use std::sync::Arc;
use std::sync::Mutex;

use weakbus::Handler;

/// Payload used across the integration tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub struct Notice(pub &'static str);

/// A component-like subscriber that records what it received.
#[derive(Default)]
#[allow(dead_code)]
pub struct Recorder {
    pub name: &'static str,
    pub seen: Mutex<Vec<u32>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<u32> {
        self.seen.lock().unwrap().clone()
    }

    /// A handler bound to this recorder that stores each message id.
    pub fn handler(self: &Arc<Self>) -> Handler<Message> {
        Handler::bound(self, |recorder: Arc<Recorder>, msg: Arc<Message>| async move {
            recorder.seen.lock().unwrap().push(msg.id);
            Ok(())
        })
    }
}
