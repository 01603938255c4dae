//! The request subsystem.
//!
//! Requests are the only part of the interpreter other threads touch: a
//! worker (the fetcher, a host service) receives a [`RequestHandle`],
//! does its work, and completes through the runloop proxy so the callback
//! runs on the owner thread. The shared table holds nothing but ids and
//! states - callbacks stay on the owner thread, keyed by id - and every
//! transition happens under the heap lock.
//!
//! Lifecycles:
//! `PENDING -> ACTIVATING -> (COMPLETE | HIBERNATING)` and
//! `PENDING -> CANCELLED -> DYING -> released`.

use crate::coroutine::CoroId;
use crate::runloop::{RemoteMsg, RunLoopProxy};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// No frame association; the callback runs whenever the result lands.
    Raw,
    /// Bound to the frame depth that issued it; the callback only runs
    /// while that frame is current, otherwise the request hibernates.
    Sync { frame_depth: usize },
    /// Bound to the coroutine; hibernates while the coroutine is not
    /// ready.
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Activating,
    Complete,
    Hibernating,
    Cancelled,
    Dying,
}

#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub id: RequestId,
    pub kind: RequestKind,
    pub coro: CoroId,
    pub state: RequestState,
}

/// The cross-thread request table. The heap holds it in an
/// `Arc<Mutex<..>>`; this lock is the only lock in the interpreter.
#[derive(Default)]
pub struct RequestTable {
    next_id: u64,
    records: FxHashMap<RequestId, RequestRecord>,
}

impl RequestTable {
    pub fn issue(&mut self, kind: RequestKind, coro: CoroId) -> RequestId {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        self.records.insert(
            id,
            RequestRecord {
                id,
                kind,
                coro,
                state: RequestState::Pending,
            },
        );
        id
    }

    pub fn get(&self, id: RequestId) -> Option<&RequestRecord> {
        self.records.get(&id)
    }

    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        self.records.get(&id).map(|r| r.state)
    }

    fn transition(&mut self, id: RequestId, from: &[RequestState], to: RequestState) -> bool {
        match self.records.get_mut(&id) {
            Some(record) if from.contains(&record.state) => {
                log::trace!("request {id:?}: {:?} -> {to:?}", record.state);
                record.state = to;
                true
            }
            _ => false,
        }
    }

    /// A worker picked the request up.
    pub fn activate(&mut self, id: RequestId) -> bool {
        self.transition(id, &[RequestState::Pending], RequestState::Activating)
    }

    pub fn complete(&mut self, id: RequestId) -> bool {
        self.transition(
            id,
            &[RequestState::Pending, RequestState::Activating, RequestState::Hibernating],
            RequestState::Complete,
        )
    }

    /// Park a result whose frame (or coroutine) is not current.
    pub fn hibernate(&mut self, id: RequestId) -> bool {
        self.transition(id, &[RequestState::Activating], RequestState::Hibernating)
    }

    pub fn wake(&mut self, id: RequestId) -> bool {
        self.transition(id, &[RequestState::Hibernating], RequestState::Activating)
    }

    /// Cancel a request that has not been picked up. A request already
    /// `ACTIVATING` is left to its callback path.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        self.transition(id, &[RequestState::Pending], RequestState::Cancelled)
    }

    /// `CANCELLED -> DYING`; the record is released when the worker's
    /// completion (or teardown) finally arrives.
    pub fn reap(&mut self, id: RequestId) -> bool {
        self.transition(id, &[RequestState::Cancelled], RequestState::Dying)
    }

    /// Drop the record entirely.
    pub fn release(&mut self, id: RequestId) -> Option<RequestRecord> {
        self.records.remove(&id)
    }

    pub fn ids_in_state(&self, state: RequestState) -> Vec<RequestId> {
        self.records
            .values()
            .filter(|r| r.state == state)
            .map(|r| r.id)
            .collect()
    }

    pub fn ids_for_coroutine(&self, coro: CoroId) -> Vec<RequestId> {
        self.records
            .values()
            .filter(|r| r.coro == coro)
            .map(|r| r.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What a worker thread holds: enough to mark progress and post the
/// completion back to the owner thread. Everything here is `Send`.
#[derive(Clone)]
pub struct RequestHandle {
    pub id: RequestId,
    pub table: Arc<Mutex<RequestTable>>,
    pub proxy: RunLoopProxy,
}

impl RequestHandle {
    /// Mark the request as picked up. Returns false if it was cancelled
    /// before the worker got to it.
    pub fn activate(&self) -> bool {
        self.table.lock().activate(self.id)
    }

    /// Post the result to the owner thread. The payload crosses threads
    /// as JSON; the owner-side callback turns it back into a variant.
    pub fn complete(self, result: std::result::Result<serde_json::Value, String>) {
        self.proxy.dispatch(RemoteMsg::RequestDone {
            id: self.id,
            result,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle() {
        let mut table = RequestTable::default();
        let id = table.issue(RequestKind::Async, CoroId(0));
        assert_eq!(table.state(id), Some(RequestState::Pending));

        assert!(table.activate(id));
        assert!(table.hibernate(id));
        assert!(table.wake(id));
        assert!(table.complete(id));
        assert!(table.release(id).is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn cancellation_path() {
        let mut table = RequestTable::default();
        let id = table.issue(RequestKind::Raw, CoroId(1));

        assert!(table.cancel(id));
        // cancelled requests cannot activate or complete
        assert!(!table.activate(id));
        assert!(!table.complete(id));

        assert!(table.reap(id));
        assert_eq!(table.state(id), Some(RequestState::Dying));
        assert!(table.release(id).is_some());
    }

    #[test]
    fn activating_requests_cannot_be_cancelled() {
        let mut table = RequestTable::default();
        let id = table.issue(RequestKind::Sync { frame_depth: 2 }, CoroId(0));
        table.activate(id);
        assert!(!table.cancel(id));
        assert_eq!(table.state(id), Some(RequestState::Activating));
    }
}
