//! Request life-cycles across threads.

use hvml_core::prelude::*;
use hvml_core::{RequestKind, RequestState};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

fn heap() -> Heap {
    Heap::new(RendererLink::new(Box::new(RecordingTransport::new())))
}

/// A document that parks forever, so the coroutine is alive when results
/// arrive.
const PARKED: &str =
    "<hvml><body><observe on $TIMERS for \"never\"><span>x</span></observe></body></hvml>";

#[test]
fn raw_request_completes_on_the_owner_thread() {
    let mut heap = heap();
    assert!(heap.is_current_thread());
    let id = heap
        .schedule_document(Rc::new(parse_document(PARKED).unwrap()))
        .unwrap();
    heap.pump();

    let delivered = Rc::new(Cell::new(false));
    let delivered2 = delivered.clone();
    let handle = heap.issue_request(
        id,
        RequestKind::Raw,
        Box::new(move |_co, result| {
            assert_eq!(result.unwrap().coerce_i64().unwrap(), 99);
            delivered2.set(true);
        }),
    );

    let worker = std::thread::spawn(move || {
        assert!(handle.activate());
        std::thread::sleep(Duration::from_millis(5));
        handle.complete(Ok(serde_json::json!(99)));
    });
    worker.join().unwrap();

    heap.process_pending();
    assert!(delivered.get());
    assert!(heap.services.requests.lock().is_empty());
}

#[test]
fn cancelled_request_never_calls_back() {
    let mut heap = heap();
    let id = heap
        .schedule_document(Rc::new(parse_document(PARKED).unwrap()))
        .unwrap();
    heap.pump();

    let handle = heap.issue_request(
        id,
        RequestKind::Raw,
        Box::new(|_, _| panic!("callback after cancellation")),
    );
    let request = handle.id;

    // PENDING -> CANCELLED -> DYING
    heap.cancel_request(request);
    assert_eq!(
        heap.services.requests.lock().state(request),
        Some(RequestState::Dying)
    );

    // the worker completes late; pickup releases without a callback
    handle.complete(Ok(serde_json::json!("late")));
    heap.process_pending();
    assert!(heap.services.requests.lock().is_empty());
}

#[test]
fn terminating_coroutine_cancels_outstanding_async_requests() {
    let mut heap = heap();
    let id = heap
        .schedule_document(Rc::new(parse_document("<hvml/>").unwrap()))
        .unwrap();

    let h1 = heap.issue_request(id, RequestKind::Async, Box::new(|_, _| panic!("h1 fired")));
    let h2 = heap.issue_request(id, RequestKind::Async, Box::new(|_, _| panic!("h2 fired")));

    // the empty document terminates immediately; termination walks the
    // async id list and cancels each
    heap.pump();

    {
        let table = heap.services.requests.lock();
        assert_eq!(table.state(h1.id), Some(RequestState::Dying));
        assert_eq!(table.state(h2.id), Some(RequestState::Dying));
    }

    // late completions release the dying records
    h1.complete(Ok(serde_json::json!(1)));
    h2.complete(Err(String::from("aborted")));
    heap.process_pending();
    assert!(heap.services.requests.lock().is_empty());
}

#[test]
fn sync_results_hibernate_until_their_frame_returns() {
    let mut heap = heap();
    let id = heap
        .schedule_document(Rc::new(parse_document(PARKED).unwrap()))
        .unwrap();
    heap.pump();

    // parked coroutine has depth 0; a sync request bound to depth 0 is
    // deliverable, one bound to depth 3 is not
    let delivered = Rc::new(Cell::new(false));
    let delivered2 = delivered.clone();
    let deliverable = heap.issue_request(
        id,
        RequestKind::Sync { frame_depth: 0 },
        Box::new(move |_, _| delivered2.set(true)),
    );
    let parked = heap.issue_request(
        id,
        RequestKind::Sync { frame_depth: 3 },
        Box::new(|_, _| panic!("frame never became current")),
    );

    deliverable.complete(Ok(serde_json::json!(null)));
    parked.clone().complete(Ok(serde_json::json!(null)));
    heap.process_pending();

    assert!(delivered.get());
    assert_eq!(
        heap.services.requests.lock().state(parked.id),
        Some(RequestState::Hibernating)
    );
}
