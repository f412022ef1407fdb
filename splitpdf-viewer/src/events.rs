use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Notifications fired by the engine's viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    PageChanging {
        page_number: usize,
    },
    ScaleChanging {
        scale: f32,
        preset_value: Option<String>,
    },
    PagesInit,
    PagesLoaded {
        pages_count: usize,
    },
    DocumentError {
        message: String,
    },
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<ViewerEvent>>,
}

/// Fan-out of engine events to subscribers. Cloned handles share listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Listeners>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut listeners = self.listeners.lock();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.senders.insert(id, sender);
        Subscription {
            id,
            bus: Arc::downgrade(&self.listeners),
            receiver,
        }
    }

    pub fn dispatch(&self, event: ViewerEvent) {
        self.listeners
            .lock()
            .senders
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().senders.len()
    }
}

/// Receiving end of an [`EventBus`]. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    bus: Weak<Mutex<Listeners>>,
    receiver: mpsc::UnboundedReceiver<ViewerEvent>,
}

impl Subscription {
    pub fn try_recv(&mut self) -> Option<ViewerEvent> {
        self.receiver.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<ViewerEvent> {
        self.receiver.recv().await
    }

    /// Takes every event queued so far without waiting.
    pub fn drain(&mut self) -> Vec<ViewerEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.bus.upgrade() {
            listeners.lock().senders.remove(&self.id);
        }
    }
}
