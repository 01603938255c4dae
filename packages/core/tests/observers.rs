//! Observer registration, wait accounting, and message wakeups.

use hvml_core::prelude::*;
use hvml_core::{Atom, LocalMsg, MessageRecord};
use std::rc::Rc;

fn heap() -> Heap {
    Heap::new(RendererLink::new(Box::new(RecordingTransport::new())))
}

fn park(heap: &mut Heap, source: &str) -> CoroId {
    let id = heap
        .schedule_document(Rc::new(parse_document(source).unwrap()))
        .unwrap();
    heap.pump();
    id
}

#[test]
fn waits_counts_live_observers() {
    let mut heap = heap();
    let id = park(
        &mut heap,
        "<hvml><body>\
         <observe on $TIMERS for \"ping\"><exit with 'ping'/></observe>\
         <observe on $TIMERS for \"pong\"><exit with 'pong'/></observe>\
         </body></hvml>",
    );

    let co = heap.coroutines.get(id.0).expect("parked, not terminated");
    assert_eq!(co.state, CoroutineState::Wait);
    assert_eq!(co.stage, Stage::EventLoop);
    // invariant: waits mirrors the observer lists at quiescence
    assert_eq!(co.waits, 2);
    assert_eq!(co.observers.len(), 2);
}

#[test]
fn matching_message_wakes_and_runs_the_handler() {
    let mut heap = heap();
    let id = park(
        &mut heap,
        "<hvml><body>\
         <observe on $TIMERS for \"ping\"><exit with 'got-ping'/></observe>\
         </body></hvml>",
    );

    let source = heap.coroutines.get(id.0).unwrap().timers_var.clone();
    let payload = Variant::array(vec![Variant::string("payload")]);
    heap.services.runloop.post(LocalMsg::Message(MessageRecord {
        target: id,
        source,
        event: Atom::intern("ping"),
        sub: None,
        extra: payload.clone(),
    }));

    heap.process_pending();
    heap.pump();

    assert!(heap.coroutines.get(id.0).is_none(), "coroutine should have exited");
    let outcomes = heap.take_outcomes();
    assert_eq!(
        outcomes[0].result.as_ref().unwrap().to_string(),
        "got-ping"
    );

    // refcount balance: every handle the dispatch took was released when
    // the coroutine terminated
    drop(outcomes);
    assert_eq!(payload.ref_count(), 1);
}

#[test]
fn non_matching_messages_leave_the_coroutine_parked() {
    let mut heap = heap();
    let id = park(
        &mut heap,
        "<hvml><body>\
         <observe on $TIMERS for \"ping\"><exit with 'x'/></observe>\
         </body></hvml>",
    );

    let source = heap.coroutines.get(id.0).unwrap().timers_var.clone();
    for event in ["pang", "pong"] {
        heap.services.runloop.post(LocalMsg::Message(MessageRecord {
            target: id,
            source: source.clone(),
            event: Atom::intern(event),
            sub: None,
            extra: Variant::undefined(),
        }));
    }
    heap.process_pending();
    heap.pump();

    let co = heap.coroutines.get(id.0).expect("still parked");
    assert_eq!(co.state, CoroutineState::Wait);
}

#[test]
fn regex_sub_matches_wake_too() {
    let mut heap = heap();
    let id = park(
        &mut heap,
        "<hvml><body>\
         <observe on $TIMERS for \"expired:/^t[0-9]+$/\"><exit with 'regex'/></observe>\
         </body></hvml>",
    );

    let source = heap.coroutines.get(id.0).unwrap().timers_var.clone();
    heap.services.runloop.post(LocalMsg::Message(MessageRecord {
        target: id,
        source,
        event: Atom::intern("expired"),
        sub: Some("t42".into()),
        extra: Variant::undefined(),
    }));
    heap.process_pending();
    heap.pump();

    let outcomes = heap.take_outcomes();
    assert_eq!(outcomes[0].result.as_ref().unwrap().to_string(), "regex");
}

#[test]
fn forget_revokes_and_lets_the_coroutine_terminate() {
    let mut heap = heap();
    // the second observer handler forgets the first; after the wake the
    // coroutine has no observers left and terminates
    let id = park(
        &mut heap,
        "<hvml><body>\
         <observe on $TIMERS for \"never\"><span>no</span></observe>\
         <observe on $TIMERS for \"drop\">\
           <forget on $TIMERS for \"never\"/>\
           <forget on $TIMERS for \"drop\"/>\
         </observe>\
         </body></hvml>",
    );

    assert_eq!(heap.coroutines.get(id.0).unwrap().waits, 2);

    let source = heap.coroutines.get(id.0).unwrap().timers_var.clone();
    heap.services.runloop.post(LocalMsg::Message(MessageRecord {
        target: id,
        source,
        event: Atom::intern("drop"),
        sub: None,
        extra: Variant::undefined(),
    }));
    heap.process_pending();
    heap.pump();

    assert!(heap.coroutines.get(id.0).is_none(), "nothing left to wait for");
}

#[test]
fn handler_frames_see_the_message_payload() {
    let mut heap = heap();
    let id = park(
        &mut heap,
        "<hvml><body>\
         <observe on $TIMERS for \"data\"><exit with $?/></observe>\
         </body></hvml>",
    );

    let source = heap.coroutines.get(id.0).unwrap().timers_var.clone();
    heap.services.runloop.post(LocalMsg::Message(MessageRecord {
        target: id,
        source,
        event: Atom::intern("data"),
        sub: None,
        extra: Variant::longint(7),
    }));
    heap.process_pending();
    heap.pump();

    let outcomes = heap.take_outcomes();
    assert_eq!(outcomes[0].result.as_ref().unwrap().coerce_i64().unwrap(), 7);
}
