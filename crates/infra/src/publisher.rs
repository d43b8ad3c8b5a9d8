//! Post-commit notification publishing.

use std::sync::Arc;

use uuid::Uuid;

use cashdrawer_events::{Event, EventBus, EventEnvelope};
use cashdrawer_ledger::CashDrawerEvent;

/// Envelope carried on the bus.
pub type CashDrawerEnvelope = EventEnvelope<CashDrawerEvent>;

/// Stream type stamped on every envelope; the stream id is the session id.
pub const SESSION_STREAM: &str = "cashdrawer.session";

/// Object-safe view of an `EventBus<CashDrawerEnvelope>`.
pub trait EnvelopeSink: Send + Sync {
    fn publish_envelope(&self, envelope: CashDrawerEnvelope) -> Result<(), String>;
}

impl<B> EnvelopeSink for B
where
    B: EventBus<CashDrawerEnvelope>,
{
    fn publish_envelope(&self, envelope: CashDrawerEnvelope) -> Result<(), String> {
        self.publish(envelope).map_err(|e| format!("{e:?}"))
    }
}

/// Publishes ledger events after the write they describe has committed.
///
/// Publishing is best-effort: the ledger row is already durable, so a bus
/// failure is logged and swallowed rather than failing the operation.
#[derive(Clone, Default)]
pub struct EventPublisher {
    sink: Option<Arc<dyn EnvelopeSink>>,
}

impl core::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}

impl EventPublisher {
    /// A publisher that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new<B>(bus: B) -> Self
    where
        B: EventBus<CashDrawerEnvelope> + 'static,
    {
        Self {
            sink: Some(Arc::new(bus)),
        }
    }

    pub fn publish(&self, event: CashDrawerEvent) {
        let Some(sink) = &self.sink else {
            return;
        };

        let event_type = event.event_type();
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            event.tenant_id(),
            *event.session_id().as_uuid(),
            SESSION_STREAM,
            event,
        );
        let event_id = envelope.event_id();

        if let Err(err) = sink.publish_envelope(envelope) {
            tracing::warn!(%event_id, event_type, error = %err, "failed to publish cash drawer event");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use cashdrawer_core::{Money, SessionId, TenantId, UserId};
    use cashdrawer_events::InMemoryEventBus;
    use cashdrawer_ledger::events::SessionOpened;

    use super::*;

    fn opened() -> CashDrawerEvent {
        CashDrawerEvent::SessionOpened(SessionOpened {
            tenant_id: TenantId::new(),
            session_id: SessionId::new(),
            session_number: 1,
            opened_by: UserId::new(),
            initial_balance: Money::from_major(100),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn envelope_is_keyed_by_session_stream() {
        let bus = Arc::new(InMemoryEventBus::<CashDrawerEnvelope>::new());
        let sub = bus.subscribe();
        let publisher = EventPublisher::new(bus.clone());

        let event = opened();
        publisher.publish(event.clone());

        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.tenant_id(), event.tenant_id());
        assert_eq!(envelope.stream_id(), *event.session_id().as_uuid());
        assert_eq!(envelope.stream_type(), SESSION_STREAM);
        assert_eq!(envelope.payload(), &event);
    }

    #[test]
    fn disabled_publisher_is_a_no_op() {
        EventPublisher::disabled().publish(opened());
    }
}
