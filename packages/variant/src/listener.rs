use crate::{Atom, Variant};
use std::rc::Rc;

/// Callback signature for post-listeners.
///
/// Receives `(source, event, args)` where `args` is always the four-slot
/// pack `[key-new, value-new, key-old, value-old]`; slots that do not apply
/// to the event are `undefined`.
pub type ListenerCallback = Rc<dyn Fn(&Variant, Atom, &[Variant])>;

pub(crate) struct ListenerEntry {
    pub(crate) event: Atom,
    pub(crate) callback: ListenerCallback,
}

/// A revocation handle for a registered post-listener.
///
/// Handles are slab keys scoped to the variant they were registered
/// against; revoking an already-revoked handle is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerHandle {
    pub(crate) key: usize,
}

impl Variant {
    /// Register a callback to run after every mutation that fires `event`
    /// on this variant. Listeners fire synchronously on the mutating
    /// thread, in registration order, after the structural change is
    /// complete.
    pub fn register_post_listener(&self, event: Atom, callback: ListenerCallback) -> ListenerHandle {
        let key = self
            .inner
            .listeners
            .borrow_mut()
            .insert(ListenerEntry { event, callback });
        ListenerHandle { key }
    }

    /// Revoke a previously registered listener. Idempotent.
    pub fn revoke_listener(&self, handle: ListenerHandle) {
        let mut listeners = self.inner.listeners.borrow_mut();
        if listeners.contains(handle.key) {
            listeners.remove(handle.key);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Fire all listeners registered for `event`.
    ///
    /// The listener list is snapshotted first so a callback may register or
    /// revoke listeners (including itself) without invalidating the
    /// iteration. Callbacks run after the mutation, so they observe the
    /// post-change container.
    pub(crate) fn fire_post(&self, event: Atom, args: &[Variant]) {
        let snapshot: Vec<ListenerCallback> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .filter(|(_, entry)| entry.event == event)
            .map(|(_, entry)| entry.callback.clone())
            .collect();

        if snapshot.is_empty() {
            return;
        }

        self.inner.generation.set(self.inner.generation.get() + 1);
        log::trace!(
            "firing {} {event} listener(s) on {} variant",
            snapshot.len(),
            self.kind_name()
        );
        for callback in snapshot {
            callback(self, event, args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grow_atom;
    use std::cell::Cell;

    #[test]
    fn listener_fires_once_per_event_and_never_after_revoke() {
        let obj = Variant::object();
        let hits = Rc::new(Cell::new(0));

        let hits2 = hits.clone();
        let handle = obj.register_post_listener(
            grow_atom(),
            Rc::new(move |_, _, _| hits2.set(hits2.get() + 1)),
        );

        obj.object_set("a", Variant::longint(1)).unwrap();
        assert_eq!(hits.get(), 1);

        obj.revoke_listener(handle);
        obj.object_set("b", Variant::longint(2)).unwrap();
        assert_eq!(hits.get(), 1);

        // double revoke is a no-op
        obj.revoke_listener(handle);
    }

    #[test]
    fn listener_may_revoke_itself_mid_fire() {
        let arr = Variant::array(vec![]);
        let slot: Rc<Cell<Option<ListenerHandle>>> = Rc::new(Cell::new(None));

        let arr2 = arr.clone();
        let slot2 = slot.clone();
        let handle = arr.register_post_listener(
            grow_atom(),
            Rc::new(move |_, _, _| {
                if let Some(h) = slot2.get() {
                    arr2.revoke_listener(h);
                }
            }),
        );
        slot.set(Some(handle));

        arr.array_push(Variant::null());
        assert_eq!(arr.listener_count(), 0);

        // revoked: a second push must not fire it (nothing to observe here
        // beyond not panicking on the stale handle)
        arr.array_push(Variant::null());
    }
}
