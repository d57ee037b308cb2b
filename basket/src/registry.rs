use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use tracing::{debug, warn};

use crate::api::EventResult;
use crate::event::{EventContext, IncomingEvent};
use crate::processors::{EventProcessor, ProcessOutcome};

pub const UNKNOWN_EVENT_TYPE: &str = "Unknown event type";
pub const INVALID_EVENT_DATA: &str = "Invalid event data";
pub const STORE_FAILED: &str = "Failed to store event";

fn report(event_type: &str, outcome: &'static str) {
    counter!(
        "basket_events_total",
        "type" => event_type.to_owned(),
        "outcome" => outcome,
    )
    .increment(1);
}

/// Routes events to the processor registered for their `type`. New kinds of
/// events are added by registering a processor; dispatch itself never
/// changes.
#[derive(Default, Clone)]
pub struct EventRegistry {
    processors: HashMap<String, Arc<dyn EventProcessor>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers under the processor's own type tag, replacing any previous one.
    pub fn register(&mut self, processor: Arc<dyn EventProcessor>) {
        let event_type = processor.event_type().to_owned();
        if self.processors.insert(event_type.clone(), processor).is_some() {
            warn!("replaced processor for {} events", event_type);
        }
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.processors.keys().cloned().collect();
        types.sort();
        types
    }

    /// Never fails: every outcome, including a processor error, is folded
    /// into the result.
    pub async fn process(&self, event: &IncomingEvent, context: &EventContext) -> EventResult {
        let event_type = event.event_type();
        let event_id = event.event_id();

        let Some(processor) = self.processors.get(event_type) else {
            report(event_type, "unknown_type");
            return EventResult::failed(event_type, event_id, UNKNOWN_EVENT_TYPE);
        };

        if !processor.validate(event) {
            report(event_type, "invalid");
            return EventResult::failed(event_type, event_id, INVALID_EVENT_DATA);
        }

        match processor.process(event, context).await {
            Ok(outcome) => {
                report(event_type, outcome.as_str());
                match outcome {
                    ProcessOutcome::Stored => EventResult::ok(event_type, event_id),
                    ProcessOutcome::Duplicate => {
                        debug!(event_type, event_id = event_id.as_deref(), "dropped duplicate event");
                        EventResult::duplicate(event_type, event_id)
                    }
                    ProcessOutcome::StoreFailed => {
                        EventResult::failed(event_type, event_id, STORE_FAILED)
                    }
                }
            }
            Err(err) => {
                warn!(event_type, event_id = event_id.as_deref(), "failed to process event: {}", err);
                report(event_type, "failed");
                EventResult::failed(event_type, event_id, err.to_string())
            }
        }
    }

    /// Processes every event concurrently. Results come back in input order,
    /// and no event's outcome depends on another's.
    pub async fn process_batch(
        &self,
        events: &[IncomingEvent],
        context: &EventContext,
    ) -> Vec<EventResult> {
        join_all(events.iter().map(|event| self.process(event, context))).await
    }
}
