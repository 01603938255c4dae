//! Runloop timers and the `$TIMERS` bridge.
//!
//! The hub owns every timer of every coroutine, keyed by `(coroutine,
//! id)`. The heap asks it for the next deadline when parking and collects
//! due timers on wakeup; a due timer turns into an `expired:<id>` message
//! on the owning coroutine's `$TIMERS` set.
//!
//! `$TIMERS` itself is a set variant bound at document scope. Its
//! listeners translate structural changes into hub calls: `grow` creates
//! and starts a timer, `shrink` destroys it, `change` re-reads interval
//! and active state.

use crate::coroutine::CoroId;
use hvml_variant::{change_atom, grow_atom, shrink_atom, Variant};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

struct TimerState {
    interval: Duration,
    repeating: bool,
    /// `None` while stopped.
    deadline: Option<Instant>,
}

/// All timers of the current heap.
#[derive(Default)]
pub struct TimerHub {
    timers: FxHashMap<(CoroId, String), TimerState>,
}

/// A timer that came due: `(owning coroutine, timer id)`.
pub struct DueTimer {
    pub coro: CoroId,
    pub id: String,
}

impl TimerHub {
    /// Create a timer. It does not run until started.
    pub fn create(&mut self, coro: CoroId, id: &str, interval: Duration) {
        self.timers.insert(
            (coro, id.to_owned()),
            TimerState {
                interval,
                repeating: true,
                deadline: None,
            },
        );
    }

    pub fn set_interval(&mut self, coro: CoroId, id: &str, interval: Duration) {
        if let Some(state) = self.timers.get_mut(&(coro, id.to_owned())) {
            state.interval = interval;
            if state.deadline.is_some() {
                state.deadline = Some(Instant::now() + interval);
            }
        }
    }

    /// Start as a repeating timer.
    pub fn start(&mut self, coro: CoroId, id: &str) {
        if let Some(state) = self.timers.get_mut(&(coro, id.to_owned())) {
            state.repeating = true;
            state.deadline = Some(Instant::now() + state.interval);
        }
    }

    /// Start for a single expiry.
    pub fn start_oneshot(&mut self, coro: CoroId, id: &str) {
        if let Some(state) = self.timers.get_mut(&(coro, id.to_owned())) {
            state.repeating = false;
            state.deadline = Some(Instant::now() + state.interval);
        }
    }

    pub fn stop(&mut self, coro: CoroId, id: &str) {
        if let Some(state) = self.timers.get_mut(&(coro, id.to_owned())) {
            state.deadline = None;
        }
    }

    pub fn destroy(&mut self, coro: CoroId, id: &str) {
        self.timers.remove(&(coro, id.to_owned()));
    }

    /// Drop every timer a terminating coroutine still owns.
    pub fn destroy_all_for(&mut self, coro: CoroId) {
        self.timers.retain(|(owner, _), _| *owner != coro);
    }

    /// The earliest pending deadline, for the runloop's park timeout.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers
            .values()
            .filter_map(|state| state.deadline)
            .min()
    }

    /// Collect timers that are due at `now`, rescheduling repeating ones
    /// and stopping one-shots.
    pub fn take_due(&mut self, now: Instant) -> Vec<DueTimer> {
        let mut due = Vec::new();
        for ((coro, id), state) in self.timers.iter_mut() {
            let Some(deadline) = state.deadline else {
                continue;
            };
            if deadline <= now {
                due.push(DueTimer {
                    coro: *coro,
                    id: id.clone(),
                });
                state.deadline = if state.repeating {
                    Some(now + state.interval)
                } else {
                    None
                };
            }
        }
        due
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

/// Read one `$TIMERS` element (`{id, interval, active}`) into hub calls.
fn sync_timer_element(hub: &mut TimerHub, coro: CoroId, element: &Variant) {
    let Some(id) = element.object_get("id").map(|v| v.to_string()) else {
        log::warn!("$TIMERS element without an id ignored");
        return;
    };
    let interval = element
        .object_get("interval")
        .and_then(|v| v.coerce_i64().ok())
        .unwrap_or(0)
        .max(0) as u64;
    let active = element
        .object_get("active")
        .map(|v| match v.as_str() {
            Some(text) => {
                text.eq_ignore_ascii_case("on")
                    || text.eq_ignore_ascii_case("yes")
                    || text.eq_ignore_ascii_case("true")
            }
            None => v.truthy(),
        })
        .unwrap_or(false);

    hub.create(coro, &id, Duration::from_millis(interval));
    if active {
        hub.start(coro, &id);
    }
}

/// Build the document-scope `$TIMERS` set and wire its listeners to the
/// hub.
pub fn make_timers_variant(hub: Rc<RefCell<TimerHub>>, coro: CoroId) -> Variant {
    let timers = Variant::set_by_key(Some("id"));

    let hub_grow = hub.clone();
    timers.register_post_listener(
        grow_atom(),
        Rc::new(move |_, _, args| {
            // args: [key-new, value-new, key-old, value-old]
            sync_timer_element(&mut hub_grow.borrow_mut(), coro, &args[1]);
        }),
    );

    let hub_shrink = hub.clone();
    timers.register_post_listener(
        shrink_atom(),
        Rc::new(move |_, _, args| {
            let id = args[2].to_string();
            hub_shrink.borrow_mut().destroy(coro, &id);
        }),
    );

    let hub_change = hub;
    timers.register_post_listener(
        change_atom(),
        Rc::new(move |_, _, args| {
            sync_timer_element(&mut hub_change.borrow_mut(), coro, &args[1]);
        }),
    );

    timers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_starts_and_shrink_destroys() {
        let hub = Rc::new(RefCell::new(TimerHub::default()));
        let coro = CoroId(1);
        let timers = make_timers_variant(hub.clone(), coro);

        timers
            .set_add(Variant::object_with([
                ("id", Variant::string("t")),
                ("interval", Variant::longint(20)),
                ("active", Variant::string("on")),
            ]))
            .unwrap();
        assert!(hub.borrow().next_deadline().is_some());

        timers.set_remove_by_key("t").unwrap();
        assert!(hub.borrow().next_deadline().is_none());
        assert!(hub.borrow().is_empty());
    }

    #[test]
    fn due_timers_reschedule_when_repeating() {
        let mut hub = TimerHub::default();
        let coro = CoroId(0);
        hub.create(coro, "a", Duration::from_millis(5));
        hub.start(coro, "a");
        hub.create(coro, "b", Duration::from_millis(5));
        hub.start_oneshot(coro, "b");

        let later = Instant::now() + Duration::from_millis(50);
        let due = hub.take_due(later);
        assert_eq!(due.len(), 2);
        // the repeating timer is rescheduled, the one-shot is parked
        let again = hub.take_due(later + Duration::from_millis(50));
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, "a");
    }

    #[test]
    fn inactive_elements_do_not_start() {
        let hub = Rc::new(RefCell::new(TimerHub::default()));
        let timers = make_timers_variant(hub.clone(), CoroId(2));
        timers
            .set_add(Variant::object_with([
                ("id", Variant::string("idle")),
                ("interval", Variant::longint(10)),
                ("active", Variant::string("off")),
            ]))
            .unwrap();
        assert!(hub.borrow().next_deadline().is_none());
        assert!(!hub.borrow().is_empty());
    }
}
