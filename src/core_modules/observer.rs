// THEORY:
// The `observer` module decouples grid mutations from whoever redraws them. The
// grid owns an `ObserverSet`; hosts subscribe a zero-argument callback and get
// back a `Subscription`. Dropping the subscription unsubscribes, so a host that
// is torn down cannot leave a dangling callback behind.
//
// Key architectural principles:
// 1.  **Synchronous Delivery**: `notify` runs every callback on the calling
//     thread, in registration order, exactly once, before returning. A redraw
//     triggered from a callback therefore sees the finished mutation.
// 2.  **Bounded Re-entrancy**: a notification raised while another is being
//     delivered is dropped (and logged) instead of recursing. The outer
//     delivery is already reporting "something changed".
// 3.  **Thread Safety**: callbacks are `Send` and the registry sits behind a
//     mutex, so a grid can move into the animation ticker task.
// 4.  **Deferred Delivery**: a `PendingNotification` carries a notification
//     out of the owner's critical section. Whoever holds a lock around the
//     grid delivers it after unlocking, so callbacks can take that lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::warn;

pub type ObserverId = u64;
type Callback = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct Registry {
    entries: Vec<(ObserverId, Callback)>,
    /// Ids unsubscribed while their callbacks were checked out for delivery.
    removed_in_flight: Vec<ObserverId>,
}

#[derive(Default)]
struct Shared {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    notifying: AtomicBool,
}

impl Shared {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight flag even if a callback panics.
struct DeliveryGuard<'a>(&'a AtomicBool);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A set of mutation callbacks.
#[derive(Default)]
pub struct ObserverSet {
    shared: Arc<Shared>,
}

/// Keeps one callback registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its callback immediately"]
pub struct Subscription {
    id: ObserverId,
    shared: Weak<Shared>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` and returns the handle that keeps it alive.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut() + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.registry().entries.push((id, Box::new(callback)));
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Removes a callback by id. Returns `false` if it was already gone.
    pub fn remove(&self, id: ObserverId) -> bool {
        remove_entry(&self.shared, id)
    }

    pub fn len(&self) -> usize {
        self.shared.registry().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every callback once. Returns `false` if the call was re-entrant and
    /// therefore dropped.
    pub fn notify(&self) -> bool {
        deliver(&self.shared)
    }

    /// A notification to be delivered later, e.g. once a lock is released.
    pub fn pending(&self) -> PendingNotification {
        PendingNotification {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A notification owed to an `ObserverSet`. Dropping it without calling
/// `deliver` discards it.
#[must_use = "a pending notification does nothing until delivered"]
pub struct PendingNotification {
    shared: Arc<Shared>,
}

impl PendingNotification {
    pub fn deliver(self) -> bool {
        deliver(&self.shared)
    }
}

fn deliver(shared: &Shared) -> bool {
    if shared.notifying.swap(true, Ordering::AcqRel) {
        warn!("dropping re-entrant grid notification");
        return false;
    }
    let _guard = DeliveryGuard(&shared.notifying);

    // Callbacks run outside the lock so they may subscribe or unsubscribe.
    let mut delivering = std::mem::take(&mut shared.registry().entries);
    for (_, callback) in delivering.iter_mut() {
        callback();
    }

    let mut registry = shared.registry();
    let removed = std::mem::take(&mut registry.removed_in_flight);
    delivering.retain(|(id, _)| !removed.contains(id));
    let added = std::mem::replace(&mut registry.entries, delivering);
    registry.entries.extend(added);
    true
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Explicitly unsubscribes; equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            remove_entry(&shared, self.id);
        }
    }
}

fn remove_entry(shared: &Shared, id: ObserverId) -> bool {
    let mut registry = shared.registry();
    let before = registry.entries.len();
    registry.entries.retain(|(entry, _)| *entry != id);
    if registry.entries.len() != before {
        return true;
    }
    if shared.notifying.load(Ordering::Acquire) && !registry.removed_in_flight.contains(&id) {
        registry.removed_in_flight.push(id);
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn each_callback_fires_once_per_notify() {
        let set = ObserverSet::new();
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        let _sa = set.subscribe(cb_a);
        let _sb = set.subscribe(cb_b);

        assert!(set.notify());
        assert!(set.notify());
        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let set = ObserverSet::new();
        let (count, cb) = counter();
        let sub = set.subscribe(cb);
        set.notify();
        drop(sub);
        set.notify();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn remove_by_id_reports_whether_it_existed() {
        let set = ObserverSet::new();
        let (_count, cb) = counter();
        let sub = set.subscribe(cb);
        assert!(set.remove(sub.id()));
        assert!(!set.remove(sub.id()));
        sub.unsubscribe();
        assert!(set.is_empty());
    }

    #[test]
    fn subscription_outliving_the_set_is_harmless() {
        let set = ObserverSet::new();
        let (_count, cb) = counter();
        let sub = set.subscribe(cb);
        drop(set);
        drop(sub);
    }

    #[test]
    fn unsubscribing_from_inside_a_callback_sticks() {
        let set = Arc::new(ObserverSet::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let (count, mut cb) = counter();
        let slot_in_cb = Arc::clone(&slot);
        let sub = set.subscribe(move || {
            cb();
            slot_in_cb.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        set.notify();
        set.notify();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn reentrant_notify_is_dropped() {
        let set = Arc::new(ObserverSet::new());
        let weak = Arc::downgrade(&set);
        let nested_results = Arc::new(Mutex::new(Vec::new()));
        let results = Arc::clone(&nested_results);
        let _sub = set.subscribe(move || {
            if let Some(set) = weak.upgrade() {
                results.lock().unwrap().push(set.notify());
            }
        });

        assert!(set.notify());
        assert_eq!(*nested_results.lock().unwrap(), vec![false]);
        // The in-flight flag is cleared afterwards.
        assert!(set.notify());
    }

    #[test]
    fn pending_notification_fires_on_delivery_only() {
        let set = ObserverSet::new();
        let (count, cb) = counter();
        let _sub = set.subscribe(cb);

        let pending = set.pending();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(pending.deliver());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(set.pending());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
