//! Event bus delivering appended events to subscribers.
//!
//! The bus owns no events: the store is the source of truth and the bus only
//! signals "the head moved". A subscription reads pages from the store
//! after its cursor and parks on the head signal once it has caught up, so
//! a subscriber can start from any cursor it has seen before (replay) and
//! never misses an event that was published while it was reading.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::watch;

use crate::store::{EventStore, EventStream};
use crate::{EventEnvelope, Position, Result};

/// Number of events fetched from the store per read.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Publish/subscribe fan-out over an [`EventStore`].
///
/// Delivery is at-least-once and ordered by position for a single
/// subscription, which implies per-aggregate order.
pub struct EventBus<S> {
    store: S,
    head: Arc<watch::Sender<Position>>,
    page_size: usize,
}

impl<S: Clone> Clone for EventBus<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            head: Arc::clone(&self.head),
            page_size: self.page_size,
        }
    }
}

impl<S> EventBus<S>
where
    S: EventStore + Clone + 'static,
{
    /// Creates a bus over `store` with the default page size.
    pub fn new(store: S) -> Self {
        Self::with_page_size(store, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(store: S, page_size: usize) -> Self {
        let (head, _) = watch::channel(Position::start());
        Self {
            store,
            head: Arc::new(head),
            page_size: page_size.max(1),
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Highest position announced through [`publish`](Self::publish).
    pub fn head(&self) -> Position {
        *self.head.borrow()
    }

    /// Announces freshly appended events to every subscriber.
    pub fn publish(&self, events: &[EventEnvelope]) {
        let Some(max) = events.iter().map(|e| e.position).max() else {
            return;
        };

        self.head.send_if_modified(|head| {
            if max > *head {
                *head = max;
                true
            } else {
                false
            }
        });
        tracing::trace!(head = %max, count = events.len(), "events published");
    }

    /// Subscribes from `from` (exclusive): replays stored events after the
    /// cursor, then follows new appends.
    ///
    /// The stream is infinite while the bus is alive. A store error is
    /// yielded as an item; polling again retries from the same cursor.
    pub fn subscribe(&self, from: Position) -> EventStream {
        let state = SubscriptionState {
            store: self.store.clone(),
            head: self.head.subscribe(),
            cursor: from,
            buffer: VecDeque::new(),
            page_size: self.page_size,
        };

        Box::pin(futures_util::stream::unfold(state, |mut state| async move {
            state.next_event().await.map(|item| (item, state))
        }))
    }
}

struct SubscriptionState<S> {
    store: S,
    head: watch::Receiver<Position>,
    cursor: Position,
    buffer: VecDeque<EventEnvelope>,
    page_size: usize,
}

impl<S: EventStore> SubscriptionState<S> {
    async fn next_event(&mut self) -> Option<Result<EventEnvelope>> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                self.cursor = event.position;
                return Some(Ok(event));
            }

            // Mark the current head as seen before reading, so an append that
            // lands after the read still wakes us up.
            let _ = self.head.borrow_and_update();

            match self.store.read_all(self.cursor, self.page_size).await {
                Ok(page) if !page.is_empty() => self.buffer.extend(page),
                Ok(_) => {
                    if self.head.changed().await.is_err() {
                        return None;
                    }
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
