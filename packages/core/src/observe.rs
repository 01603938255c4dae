//! Observer records and message matching.
//!
//! An observer subscribes a vDOM element (the `<observe>` element whose
//! children form the handler) to an `(observed variant, event, sub)`
//! triple. Observers live on their coroutine in three lists selected by
//! the observed variant's kind; the `waits` counter mirrors the total so
//! the scheduler knows when a finished coroutine must park instead of
//! terminating.
//!
//! Revocation is exactly-once: the native `on_forget` hook fires when the
//! last observer for a given `(event, sub)` pair on a native variant is
//! revoked, and teardown removes each record exactly once.

use hvml_dom::DomId;
use hvml_variant::{Atom, Variant};
use hvml_vdom::VNodeId;
use regex::Regex;
use slab::Slab;

/// How a stored sub-type matches an incoming message's sub.
pub enum SubMatch {
    Any,
    Literal(String),
    Regex(Regex),
}

impl SubMatch {
    /// Literal equality, or a regex match when the stored sub is in
    /// `/pattern/` form.
    pub fn parse(sub: Option<&str>) -> Self {
        match sub {
            None | Some("") | Some("*") => SubMatch::Any,
            Some(text) => {
                if let Some(stripped) = text.strip_prefix('/').and_then(|t| t.strip_suffix('/')) {
                    match Regex::new(stripped) {
                        Ok(regex) => return SubMatch::Regex(regex),
                        Err(err) => {
                            log::warn!("bad observer sub regex {text:?}: {err}; matching literally")
                        }
                    }
                }
                SubMatch::Literal(text.to_owned())
            }
        }
    }

    pub fn matches(&self, sub: Option<&str>) -> bool {
        match self {
            SubMatch::Any => true,
            SubMatch::Literal(expected) => sub == Some(expected.as_str()),
            SubMatch::Regex(regex) => sub.map(|s| regex.is_match(s)).unwrap_or(false),
        }
    }

    /// The literal form, for the native `on_observe`/`on_forget` relay.
    pub fn as_text(&self) -> String {
        match self {
            SubMatch::Any => String::from("*"),
            SubMatch::Literal(text) => text.clone(),
            SubMatch::Regex(regex) => format!("/{}/", regex.as_str()),
        }
    }
}

pub struct Observer {
    pub observed: Variant,
    pub event: Atom,
    pub sub: SubMatch,
    /// Scope node the handler frame resolves variables from.
    pub scope: VNodeId,
    /// Output-DOM insertion point the handler frame starts at.
    pub edom_element: DomId,
    /// The `<observe>` element whose children are the handler.
    pub pos: VNodeId,
    /// The post-listener bridging container mutations onto the message
    /// bus, revoked together with the observer.
    pub listener: Option<hvml_variant::ListenerHandle>,
}

impl Observer {
    pub fn matches(&self, source: &Variant, event: Atom, sub: Option<&str>) -> bool {
        self.observed.ptr_eq(source) && self.event == event && self.sub.matches(sub)
    }
}

/// Which list an observer lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverList {
    Common,
    Dynamic,
    Native,
}

pub fn list_for(observed: &Variant) -> ObserverList {
    if observed.is_native() {
        ObserverList::Native
    } else if observed.is_dynamic() {
        ObserverList::Dynamic
    } else {
        ObserverList::Common
    }
}

/// A stable handle to a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle {
    pub list: ObserverList,
    pub key: usize,
}

/// The three per-coroutine observer lists.
#[derive(Default)]
pub struct ObserverLists {
    common: Slab<Observer>,
    dynamic: Slab<Observer>,
    native: Slab<Observer>,
}

impl ObserverLists {
    fn slab(&self, list: ObserverList) -> &Slab<Observer> {
        match list {
            ObserverList::Common => &self.common,
            ObserverList::Dynamic => &self.dynamic,
            ObserverList::Native => &self.native,
        }
    }

    fn slab_mut(&mut self, list: ObserverList) -> &mut Slab<Observer> {
        match list {
            ObserverList::Common => &mut self.common,
            ObserverList::Dynamic => &mut self.dynamic,
            ObserverList::Native => &mut self.native,
        }
    }

    /// Insert, relaying `on_observe` when this is the first observer for
    /// the `(event, sub)` pair on a native variant.
    pub fn register(&mut self, observer: Observer) -> ObserverHandle {
        let list = list_for(&observer.observed);
        if list == ObserverList::Native {
            let first_for_pair = !self.native.iter().any(|(_, existing)| {
                existing.observed.ptr_eq(&observer.observed)
                    && existing.event == observer.event
                    && existing.sub.as_text() == observer.sub.as_text()
            });
            if first_for_pair {
                if let Some(ops) = observer.observed.as_native_ops() {
                    ops.on_observe(observer.event, &observer.sub.as_text());
                }
            }
        }
        let key = self.slab_mut(list).insert(observer);
        ObserverHandle { list, key }
    }

    /// Remove exactly once, relaying `on_forget` when the last observer
    /// for the pair goes away. Returns the record if the handle was live.
    pub fn revoke(&mut self, handle: ObserverHandle) -> Option<Observer> {
        let slab = self.slab_mut(handle.list);
        if !slab.contains(handle.key) {
            return None;
        }
        let observer = slab.remove(handle.key);
        if let Some(listener) = observer.listener {
            observer.observed.revoke_listener(listener);
        }
        if handle.list == ObserverList::Native {
            let last_for_pair = !self.native.iter().any(|(_, existing)| {
                existing.observed.ptr_eq(&observer.observed)
                    && existing.event == observer.event
                    && existing.sub.as_text() == observer.sub.as_text()
            });
            if last_for_pair {
                if let Some(ops) = observer.observed.as_native_ops() {
                    ops.on_forget(observer.event, &observer.sub.as_text());
                }
            }
        }
        Some(observer)
    }

    /// Handles matching `(source, event, sub)` in registration order.
    /// Snapshotting handles (not references) keeps mid-dispatch
    /// revocation safe.
    pub fn matching(&self, source: &Variant, event: Atom, sub: Option<&str>) -> Vec<ObserverHandle> {
        let list = list_for(source);
        self.slab(list)
            .iter()
            .filter(|(_, observer)| observer.matches(source, event, sub))
            .map(|(key, _)| ObserverHandle { list, key })
            .collect()
    }

    pub fn get(&self, handle: ObserverHandle) -> Option<&Observer> {
        self.slab(handle.list).get(handle.key)
    }

    /// Handles whose `(observed, event)` match, regardless of sub - the
    /// `<forget>` selection.
    pub fn matching_registration(
        &self,
        observed: &Variant,
        event: Option<Atom>,
    ) -> Vec<ObserverHandle> {
        let list = list_for(observed);
        self.slab(list)
            .iter()
            .filter(|(_, observer)| {
                observer.observed.ptr_eq(observed)
                    && event.map(|e| observer.event == e).unwrap_or(true)
            })
            .map(|(key, _)| ObserverHandle { list, key })
            .collect()
    }

    /// Every live handle, for teardown. Each record is removed exactly
    /// once by the caller.
    pub fn all_handles(&self) -> Vec<ObserverHandle> {
        let mut handles = Vec::new();
        for list in [ObserverList::Common, ObserverList::Dynamic, ObserverList::Native] {
            handles.extend(self.slab(list).iter().map(|(key, _)| ObserverHandle { list, key }));
        }
        handles
    }

    pub fn len(&self) -> usize {
        self.common.len() + self.dynamic.len() + self.native.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvml_variant::NativeOps;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn sub_matching_literal_and_regex() {
        let literal = SubMatch::parse(Some("t"));
        assert!(literal.matches(Some("t")));
        assert!(!literal.matches(Some("other")));
        assert!(!literal.matches(None));

        let regex = SubMatch::parse(Some("/^t[0-9]+$/"));
        assert!(regex.matches(Some("t42")));
        assert!(!regex.matches(Some("x42")));

        assert!(SubMatch::parse(None).matches(Some("anything")));
    }

    struct ForgetProbe {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl NativeOps for ForgetProbe {
        fn on_observe(&self, event: hvml_variant::Atom, sub: &str) {
            self.events.borrow_mut().push(format!("observe {event}:{sub}"));
        }
        fn on_forget(&self, event: hvml_variant::Atom, sub: &str) {
            self.events.borrow_mut().push(format!("forget {event}:{sub}"));
        }
    }

    #[test]
    fn on_forget_fires_once_per_pair() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let native = Variant::native(Rc::new(ForgetProbe {
            events: events.clone(),
        }));

        let mut lists = ObserverLists::default();
        let make = |sub: &str| Observer {
            observed: native.clone(),
            event: Atom::intern("expired"),
            sub: SubMatch::parse(Some(sub)),
            scope: VNodeId(0),
            edom_element: DomId(0),
            pos: VNodeId(0),
            listener: None,
        };

        let a = lists.register(make("t"));
        let b = lists.register(make("t"));
        let c = lists.register(make("u"));

        // two registrations of the same pair, one on_observe
        assert_eq!(
            events.borrow().as_slice(),
            ["observe expired:t", "observe expired:u"]
        );

        assert!(lists.revoke(a).is_some());
        assert!(lists.revoke(b).is_some());
        // revoking a dead handle is a no-op, not a second on_forget
        assert!(lists.revoke(b).is_none());
        assert!(lists.revoke(c).is_some());

        assert_eq!(
            events.borrow().as_slice(),
            [
                "observe expired:t",
                "observe expired:u",
                "forget expired:t",
                "forget expired:u"
            ]
        );
        assert!(lists.is_empty());
    }
}
