//! Event helpers for integration tests

use news_archives::Event;
use tokio::sync::broadcast::Receiver;

/// Every event already queued on `events`
pub fn drain_events(events: &mut Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Batch indices announced by `BatchStarted`, in order
pub fn started_batches(events: &[Event]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::BatchStarted { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}
