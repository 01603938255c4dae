//! Outstanding async requests are torn down with their coroutine.

use hvml::prelude::*;
use hvml_core::{RequestKind, RequestState};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn exiting_coroutine_cancels_both_fetches() {
    let mut heap = Heap::new(RendererLink::new(Box::new(RecordingTransport::new())));
    let id = heap
        .schedule_document(Rc::new(parse_document("<hvml/>").unwrap()))
        .unwrap();

    // two async "fetches" whose callbacks must never run
    let h1 = heap.issue_request(id, RequestKind::Async, Box::new(|_, _| panic!("h1 callback")));
    let h2 = heap.issue_request(id, RequestKind::Async, Box::new(|_, _| panic!("h2 callback")));

    // slow workers: neither returns before the coroutine exits
    let fired = Arc::new(AtomicBool::new(false));
    let workers: Vec<_> = [h1.clone(), h2.clone()]
        .into_iter()
        .map(|handle| {
            let fired = fired.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                fired.store(true, Ordering::SeqCst);
                handle.complete(Ok(serde_json::json!({ "status": "late" })));
            })
        })
        .collect();

    // the empty document runs once and exits; shutdown walks the
    // async-request list: PENDING -> CANCELLED -> DYING
    let outcome = heap.run();
    assert_eq!(outcome.outcomes.len(), 1);
    assert!(outcome.outcomes[0].exception.is_none());

    {
        let table = heap.services.requests.lock();
        for id in [h1.id, h2.id] {
            let state = table.state(id);
            assert!(
                state == Some(RequestState::Dying) || state.is_none(),
                "unexpected state {state:?}"
            );
        }
    }

    // once the workers' late completions are picked up, both records are
    // released - and no callback fired (the panics above would have)
    for worker in workers {
        worker.join().unwrap();
    }
    assert!(fired.load(Ordering::SeqCst));
    heap.process_pending();
    assert!(heap.services.requests.lock().is_empty());
}
