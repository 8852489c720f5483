//! Canonicalizes event records, persists them, and hands them to the events
//! hub. Write and broadcast are independent — a store failure must not
//! suppress broadcast, and vice versa.

use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::hubs::HubManager;
use crate::model::EventEntry;
use crate::stores::traits::EventStore;

pub struct Emitter {
    event_store: Arc<dyn EventStore>,
    hubs: Arc<HubManager>,
    dispatcher: Arc<Dispatcher>,
}

impl Emitter {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        hubs: Arc<HubManager>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            event_store,
            hubs,
            dispatcher,
        }
    }

    /// Assigns ID/timestamp if unset, writes to the event store, broadcasts
    /// on the events hub, and matches the event against dispatcher routes.
    /// Each path is independent: a store failure must not suppress
    /// broadcast or dispatch, and vice versa (failures are logged, not
    /// propagated to the caller).
    pub async fn emit(&self, event: EventEntry) {
        let event = event.finalize();

        if let Err(err) = self.event_store.add_event(event.clone()).await {
            tracing::warn!(error = %err, event_id = %event.id, "event store write failed");
        }

        self.hubs.events().broadcast(event.clone());
        self.dispatcher.dispatch(event);
    }
}
