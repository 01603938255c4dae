//! The end-to-end scenarios: literal documents, observable outcomes.

use hvml::prelude::*;

#[test]
fn empty_document() {
    let (outcome, messages) = run_document_recording("<hvml/>").unwrap();

    assert_eq!(outcome.outcomes.len(), 1);
    let coroutine = &outcome.outcomes[0];
    assert!(coroutine.exception.is_none());
    assert_eq!(
        coroutine.html,
        "<html><head></head><body></body></html>"
    );

    // one renderer call: the window for the finished first round
    let ops: Vec<Operation> = messages.iter().map(|m| m.operation).collect();
    assert_eq!(ops, vec![Operation::CreatePlainWindow]);
}

#[test]
fn iterate_with_counter() {
    let (outcome, _) = run_document_recording(
        "<hvml><body><iterate on 3L><span>$%</span></iterate></body></hvml>",
    )
    .unwrap();

    let coroutine = &outcome.outcomes[0];
    assert!(coroutine.exception.is_none());
    assert_eq!(
        coroutine.html,
        "<html><head></head><body><span>0</span><span>1</span><span>2</span></body></html>"
    );
}

#[test]
fn timer_expiry_wakes_the_observer() {
    let start = std::time::Instant::now();
    let (outcome, _) = run_document_recording(
        "<hvml>\
         <head>\
           <init as 'TIMERS'>[{\"id\": \"t\", \"interval\": 20, \"active\": \"on\"}]</init>\
         </head>\
         <body>\
           <observe on $TIMERS for \"expired:t\"><exit with 'fired'/></observe>\
         </body>\
         </hvml>",
    )
    .unwrap();
    let elapsed = start.elapsed();

    let coroutine = &outcome.outcomes[0];
    assert!(coroutine.exception.is_none());
    assert_eq!(coroutine.result.as_ref().unwrap().to_string(), "fired");
    assert!(
        elapsed >= std::time::Duration::from_millis(15),
        "fired after {elapsed:?}, expected ~20ms"
    );
}

#[test]
fn catch_consumes_a_named_exception() {
    let (outcome, _) = run_document_recording(
        "<hvml><inherit>{{ raise('BadName') }}<catch for `BadName`><exit with 'ok'/></catch></inherit></hvml>",
    )
    .unwrap();

    let coroutine = &outcome.outcomes[0];
    // the catch consumed the exception; the run is clean and exits 'ok'
    assert!(coroutine.exception.is_none(), "{:?}", coroutine.exception);
    assert_eq!(coroutine.result.as_ref().unwrap().to_string(), "ok");
}

#[test]
fn uncaught_exception_is_reported_not_fatal() {
    let (outcome, _) = run_document_recording(
        "<hvml><inherit>{{ raise('NoSuchKey') }}<catch for `BadName`><exit with 'wrong'/></catch></inherit></hvml>",
    )
    .unwrap();

    let coroutine = &outcome.outcomes[0];
    let exception = coroutine.exception.as_ref().expect("must surface");
    assert_eq!(exception.atom().as_str(), "NoSuchKey");
    assert_ne!(
        coroutine.result.as_ref().map(|v| v.to_string()),
        Some(String::from("wrong"))
    );
}

#[test]
fn catch_all_arm_matches_any_exception() {
    let (outcome, _) = run_document_recording(
        "<hvml><inherit>{{ raise('Whatever') }}<catch><exit with 'caught'/></catch></inherit></hvml>",
    )
    .unwrap();
    let coroutine = &outcome.outcomes[0];
    assert!(coroutine.exception.is_none());
    assert_eq!(coroutine.result.as_ref().unwrap().to_string(), "caught");
}

#[test]
fn container_growth_wakes_its_observer() {
    // a timer-driven update appends to $list; the grow event routed
    // through the message bus wakes the second observer
    let (outcome, _) = run_document_recording(
        "<hvml>\
         <head>\
           <init as 'TIMERS'>[{\"id\": \"k\", \"interval\": 10, \"active\": \"on\"}]</init>\
           <init as 'list'>[1]</init>\
         </head>\
         <body>\
           <observe on $TIMERS for \"expired:k\">\
             <update on $list to 'append' with 99/>\
             <forget on $TIMERS for \"expired\"/>\
           </observe>\
           <observe on $list for \"grow\">\
             <exit with 'grown'/>\
           </observe>\
         </body>\
         </hvml>",
    )
    .unwrap();

    let coroutine = &outcome.outcomes[0];
    assert!(coroutine.exception.is_none(), "{:?}", coroutine.exception);
    assert_eq!(coroutine.result.as_ref().unwrap().to_string(), "grown");
}

#[test]
fn timers_can_tick_more_than_once() {
    // a repeating 10ms timer; the observer counts three expirations into
    // the DOM before exiting
    let (outcome, _) = run_document_recording(
        "<hvml>\
         <head>\
           <init as 'TIMERS'>[{\"id\": \"beat\", \"interval\": 10, \"active\": \"on\"}]</init>\
         </head>\
         <body>\
           <observe on $TIMERS for \"expired:beat\">\
             <i>.</i>\
             <test on $DOC.query('i').count>\
               <match for \"MATCH: GE 3\"><exit with 'threebeats'/></match>\
             </test>\
           </observe>\
         </body>\
         </hvml>",
    )
    .unwrap();

    let coroutine = &outcome.outcomes[0];
    assert!(coroutine.exception.is_none());
    assert_eq!(coroutine.result.as_ref().unwrap().to_string(), "threebeats");
    assert_eq!(coroutine.html.matches("<i>.</i>").count(), 3, "{}", coroutine.html);
}
