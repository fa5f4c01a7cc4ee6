//! Typed publish/subscribe registry
//!
//! Subscribers register a callback for one category (or for everything) and
//! get back a [`SubscriptionId`]. Nothing is cleaned up automatically: the
//! owner of a subscription must call [`Registry::unsubscribe`] before it goes
//! away.
//!
//! Callbacks run synchronously on the publishing task (the router task for
//! domain events), so they should hand work off rather than block.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::router::{DomainEvent, EventCategory};

/// Events that can be filtered by category
pub trait Categorized {
    type Category: Copy + Eq + fmt::Debug + Send + Sync + 'static;

    fn category(&self) -> Self::Category;
}

impl Categorized for DomainEvent {
    type Category = EventCategory;

    fn category(&self) -> EventCategory {
        DomainEvent::category(self)
    }
}

/// Subscriber callback
pub type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by `subscribe`, needed to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Entry<E: Categorized> {
    id: SubscriptionId,
    /// `None` = every category
    category: Option<E::Category>,
    callback: Callback<E>,
}

/// Callback registry for one event type
pub struct Registry<E: Categorized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<Entry<E>>>,
}

/// Registry for routed domain events
pub type EventBus = Registry<DomainEvent>;

impl<E: Categorized> Default for Registry<E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<E: Categorized> Registry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, category: Option<E::Category>, callback: Callback<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push(Entry {
            id,
            category,
            callback,
        });
        id
    }

    /// Register for one category
    pub fn subscribe<F>(&self, category: E::Category, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.insert(Some(category), Arc::new(callback))
    }

    /// Register for every category
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(callback))
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// The lock is released before callbacks run, so a callback may
    /// unsubscribe itself.
    pub fn publish(&self, event: &E) {
        let category = event.category();
        let targets: Vec<Callback<E>> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.category.map_or(true, |c| c == category))
            .map(|e| Arc::clone(&e.callback))
            .collect();

        for callback in targets {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::EntityRef;
    use std::sync::atomic::AtomicUsize;

    fn mute_event() -> DomainEvent {
        DomainEvent::MuteChanged {
            entity: EntityRef::input("Mic"),
            muted: true,
        }
    }

    #[test]
    fn test_publish_filters_by_category() {
        let bus = EventBus::new();
        let audio = Arc::new(AtomicUsize::new(0));
        let scenes = Arc::new(AtomicUsize::new(0));

        let a = Arc::clone(&audio);
        bus.subscribe(EventCategory::Audio, move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        let s = Arc::clone(&scenes);
        bus.subscribe(EventCategory::Scenes, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&mute_event());

        assert_eq!(audio.load(Ordering::SeqCst), 1);
        assert_eq!(scenes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = bus.subscribe_all(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&mute_event());
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&mute_event());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<parking_lot::Mutex<Option<SubscriptionId>>> = Arc::default();

        let bus_clone = Arc::clone(&bus);
        let slot_clone = Arc::clone(&slot);
        let id = bus.subscribe_all(move |_| {
            if let Some(id) = *slot_clone.lock() {
                bus_clone.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        bus.publish(&mute_event());
        assert_eq!(bus.len(), 0);
    }
}
