//! The heap: the process-wide registry of coroutines and the run loop
//! that drives them.
//!
//! One heap owns one runloop binding, one renderer link, the timer hub,
//! and the request table. All coroutine work happens on the thread that
//! calls [`Heap::run`]; the request table and the runloop proxy are the
//! only pieces other threads see.

use crate::builtins::make_builtins;
use crate::coroutine::{CoroId, Coroutine, CoroutineState, Stage};
use crate::edom::elements_variant;
use crate::error::{ErrorKind, Exception, HvmlError, Result};
use crate::observe::ObserverHandle;
use crate::ops::OpsTable;
use crate::request::{RequestHandle, RequestId, RequestKind, RequestState, RequestTable};
use crate::runloop::{LocalMsg, MessageRecord, Polled, RemoteMsg, RunLoop, RunLoopProxy};
use crate::schedule;
use crate::stack::{Frame, FrameKind};
use crate::timers::TimerHub;
use hvml_dom::DomTree;
use hvml_renderer::RendererLink;
use hvml_variant::{change_atom, Variant};
use hvml_vdom::VDocument;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use slab::Slab;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

/// A request completion callback, run on the owner thread against the
/// issuing coroutine.
pub type RequestCallback = Box<dyn FnOnce(&mut Coroutine, Result<Variant>)>;

/// The shared, non-coroutine half of the heap, handed to ops by
/// reference.
pub struct Services {
    pub runloop: Rc<RunLoop>,
    pub proxy: RunLoopProxy,
    pub renderer: Rc<RendererLink>,
    pub timer_hub: Rc<RefCell<TimerHub>>,
    pub requests: Arc<Mutex<RequestTable>>,
    /// Documents `<load>` asked to spawn; drained after each tick.
    pub spawn_queue: RefCell<Vec<Rc<VDocument>>>,
    pub ops: OpsTable,
}

/// What one coroutine left behind.
pub struct CoroutineOutcome {
    pub id: CoroId,
    pub result: Option<Variant>,
    pub exception: Option<Exception>,
    pub html: String,
}

/// What a full run left behind, in termination order.
pub struct RunOutcome {
    pub outcomes: Vec<CoroutineOutcome>,
}

impl RunOutcome {
    pub fn first(&self) -> Option<&CoroutineOutcome> {
        self.outcomes.first()
    }

    /// True when no coroutine terminated with a pending exception.
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| o.exception.is_none())
    }
}

pub struct Heap {
    pub coroutines: Slab<Coroutine>,
    pub services: Services,
    owner: ThreadId,
    /// The coroutine currently being stepped.
    pub current: Option<CoroId>,
    outcomes: Vec<CoroutineOutcome>,
    callbacks: FxHashMap<RequestId, RequestCallback>,
    /// Sync results parked until their frame is current again:
    /// `(coroutine, frame depth, result)`.
    parked_results: FxHashMap<RequestId, (CoroId, usize, Result<Variant>)>,
}

impl Heap {
    pub fn new(renderer: RendererLink) -> Self {
        let runloop = Rc::new(RunLoop::new());
        let proxy = runloop.proxy();
        Heap {
            coroutines: Slab::new(),
            services: Services {
                runloop,
                proxy,
                renderer: Rc::new(renderer),
                timer_hub: Rc::new(RefCell::new(TimerHub::default())),
                requests: Arc::new(Mutex::new(RequestTable::default())),
                spawn_queue: RefCell::new(Vec::new()),
                ops: OpsTable::new(),
            },
            owner: thread::current().id(),
            current: None,
            outcomes: Vec::new(),
            callbacks: FxHashMap::default(),
            parked_results: FxHashMap::default(),
        }
    }

    /// The sole cross-thread guard: variant mutation, frame transitions
    /// and DOM edits all belong to the owner thread.
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// A proxy other threads may use to reach this heap's runloop.
    pub fn proxy(&self) -> RunLoopProxy {
        self.services.proxy.clone()
    }

    /// Create a coroutine for `doc`, queued ready at its root element.
    pub fn schedule_document(&mut self, doc: Rc<VDocument>) -> Result<CoroId> {
        let root = doc
            .root_element()
            .ok_or_else(|| HvmlError::new(ErrorKind::InvalidValue, "document has no root"))?;

        let entry = self.coroutines.vacant_entry();
        let id = CoroId(entry.key());

        let edom = Rc::new(RefCell::new(match doc.target.as_str() {
            "html" => DomTree::new_html(),
            other => DomTree::new(other),
        }));
        let (builtins, timers_var) =
            make_builtins(id, self.services.timer_hub.clone(), edom.clone());

        let mut co = Coroutine::new(id, doc.clone(), edom.clone(), builtins, timers_var);

        let root_edom = edom.borrow().root();
        let element = doc.element(root).expect("root is an element");
        let mut frame = Frame::new(
            FrameKind::Normal,
            Some(root),
            root,
            root_edom,
            self.services.ops.for_tag(&element.tag),
        );
        frame.set_symbol('@', elements_variant(vec![root_edom]));
        frame.set_symbol('!', Variant::object());
        co.stack.push(frame);

        log::debug!("scheduled coroutine {id:?} ({} vdom nodes)", doc.node_count());
        entry.insert(co);
        Ok(id)
    }

    /// Pump until every coroutine has exited (or `Stop` arrives).
    pub fn run(&mut self) -> RunOutcome {
        debug_assert!(self.is_current_thread());
        loop {
            self.drain_pending_messages();
            self.tick();
            self.spawn_pending();

            if self.coroutines.is_empty() {
                break;
            }
            if self.any_ready() {
                continue;
            }

            // everything is parked: sleep until a timer or message
            let deadline = self.services.timer_hub.borrow().next_deadline();
            match self.services.runloop.wait(deadline) {
                Polled::Local(msg) => self.handle_local(msg),
                Polled::Remote(msg) => {
                    if !self.handle_remote(msg) {
                        break;
                    }
                }
                Polled::TimedOut => self.fire_due_timers(),
                Polled::Closed => break,
            }
        }

        RunOutcome {
            outcomes: std::mem::take(&mut self.outcomes),
        }
    }

    /// One heap-level tick: advance every ready coroutine by one
    /// transition, then settle any that reached quiescence.
    pub fn tick(&mut self) {
        let ready: Vec<CoroId> = self
            .coroutines
            .iter()
            .filter(|(_, co)| co.state == CoroutineState::Ready)
            .map(|(key, _)| CoroId(key))
            .collect();

        for id in ready {
            let Some(co) = self.coroutines.get_mut(id.0) else {
                continue;
            };
            self.current = Some(id);
            schedule::step(co, &self.services);
            self.current = None;

            if self
                .coroutines
                .get(id.0)
                .map(|co| co.stack.is_empty())
                .unwrap_or(false)
            {
                self.finish_quiescent(id);
            }
        }
        self.deliver_parked_results();
    }

    pub fn any_ready(&self) -> bool {
        self.coroutines
            .iter()
            .any(|(_, co)| co.state == CoroutineState::Ready)
    }

    /// Tick until no coroutine is ready, without blocking on the runloop.
    pub fn pump(&mut self) {
        while self.any_ready() {
            self.tick();
            self.spawn_pending();
        }
    }

    /// Drain queued messages and completions without blocking. Useful for
    /// hosts that own their own outer loop.
    pub fn process_pending(&mut self) {
        self.drain_pending_messages();
    }

    /// Fire timers that are due right now (hosts with their own loop call
    /// this after sleeping).
    pub fn expire_timers(&mut self) {
        self.fire_due_timers();
    }

    /// Outcomes of coroutines that terminated so far.
    pub fn take_outcomes(&mut self) -> Vec<CoroutineOutcome> {
        std::mem::take(&mut self.outcomes)
    }

    fn drain_pending_messages(&mut self) {
        loop {
            match self.services.runloop.try_next() {
                Polled::Local(msg) => self.handle_local(msg),
                Polled::Remote(msg) => {
                    self.handle_remote(msg);
                }
                _ => return,
            }
        }
    }

    fn spawn_pending(&mut self) {
        let docs: Vec<Rc<VDocument>> = self.services.spawn_queue.borrow_mut().drain(..).collect();
        for doc in docs {
            if let Err(err) = self.schedule_document(doc) {
                log::warn!("spawn of loaded document failed: {err}");
            }
        }
    }

    fn handle_local(&mut self, msg: LocalMsg) {
        match msg {
            LocalMsg::Message(record) => self.dispatch_now(record),
        }
    }

    /// Returns false when the loop should stop.
    fn handle_remote(&mut self, msg: RemoteMsg) -> bool {
        match msg {
            RemoteMsg::Wake(id) => {
                if let Some(co) = self.coroutines.get_mut(id.0) {
                    if co.state == CoroutineState::Wait {
                        co.state = CoroutineState::Ready;
                    }
                }
                true
            }
            RemoteMsg::RequestDone { id, result } => {
                self.handle_request_done(id, result);
                true
            }
            RemoteMsg::Stop => false,
        }
    }

    /// Route a message to every matching observer, in registration order,
    /// pushing one handler frame each and waking the coroutine.
    fn dispatch_now(&mut self, record: MessageRecord) {
        let Some(co) = self.coroutines.get_mut(record.target.0) else {
            return;
        };

        let handles = co
            .observers
            .matching(&record.source, record.event, record.sub.as_deref());
        if handles.is_empty() {
            return;
        }

        let suppress_equal = record.event == change_atom();
        let mut woke = false;
        for handle in handles {
            if suppress_equal && !Self::change_is_fresh(co, handle, &record.extra) {
                continue;
            }
            let Some(observer) = co.observers.get(handle) else {
                continue;
            };

            let element = co.doc.element(observer.pos).cloned();
            let Some(element) = element else {
                continue;
            };
            let mut frame = Frame::new(
                FrameKind::Pseudo,
                Some(observer.pos),
                observer.scope,
                observer.edom_element,
                self.services.ops.for_tag(&element.tag),
            );
            frame.set_symbol('<', record.extra.clone());
            frame.set_symbol('?', record.extra.clone());
            frame.set_symbol('@', elements_variant(vec![observer.edom_element]));
            frame.set_symbol('!', Variant::object());
            frame.child_input = Some(record.extra.clone());
            co.stack.push(frame);
            woke = true;
        }

        if woke {
            log::trace!(
                "message {}{} woke coroutine {:?}",
                record.event,
                record.sub.as_deref().map(|s| format!(":{s}")).unwrap_or_default(),
                record.target
            );
            co.state = CoroutineState::Ready;
        }
    }

    /// Timer-driven change observers compare against the cached value;
    /// equal values do not re-dispatch.
    fn change_is_fresh(co: &mut Coroutine, handle: ObserverHandle, value: &Variant) -> bool {
        let key = (handle.list as usize, handle.key);
        if let Some(cached) = co.observed_cache.get(&key) {
            if cached.eq_by_value(value) {
                return false;
            }
        }
        co.observed_cache.insert(key, value.clone());
        true
    }

    fn fire_due_timers(&mut self) {
        let due = self.services.timer_hub.borrow_mut().take_due(Instant::now());
        for timer in due {
            let Some(co) = self.coroutines.get(timer.coro.0) else {
                continue;
            };
            let source = co.timers_var.clone();
            let extra = source
                .set_get_by_key(&timer.id)
                .unwrap_or_else(Variant::undefined);
            log::trace!("timer {} expired on {:?}", timer.id, timer.coro);
            self.dispatch_now(MessageRecord {
                target: timer.coro,
                source,
                event: hvml_variant::Atom::intern("expired"),
                sub: Some(timer.id),
                extra,
            });
        }
    }

    /// A coroutine's stack drained: attach the renderer after the first
    /// round, then park or terminate.
    fn finish_quiescent(&mut self, id: CoroId) {
        let Some(co) = self.coroutines.get_mut(id.0) else {
            return;
        };

        if co.stage == Stage::FirstRound {
            co.stage = Stage::EventLoop;
            match Self::attach_renderer(co, &self.services) {
                Ok(page) => co.page = Some(page),
                Err(err) => {
                    log::warn!("renderer attach failed for {id:?}: {err}");
                    schedule::capture_exception(co, err);
                    self.terminate(id);
                    return;
                }
            }
        }

        let co = self.coroutines.get_mut(id.0).expect("still present");
        if co.exiting {
            self.terminate(id);
        } else if co.exception.is_some() {
            self.terminate(id);
        } else if co.waits > 0 {
            log::trace!("coroutine {id:?} parked ({} observers)", co.waits);
            co.state = CoroutineState::Wait;
        } else {
            self.terminate(id);
        }
    }

    /// `createPlainWindow` for the finished first round, then mirror
    /// whatever the round built.
    fn attach_renderer(co: &mut Coroutine, services: &Services) -> Result<u64> {
        let page = services.renderer.create_plain_window(0, "main", "main")?;
        let (root, html, has_children) = {
            let edom = co.edom.borrow();
            let root = edom.root();
            let has_children = edom
                .children(root)
                .iter()
                .any(|&child| !edom.children(child).is_empty());
            (root, edom.inner_html(root), has_children)
        };
        if has_children {
            services.renderer.displace_child(page, root.0 as u64, &html)?;
        }
        Ok(page)
    }

    /// Unlink a coroutine: revoke every observer exactly once, cancel
    /// outstanding async requests, drop its timers, record the outcome.
    fn terminate(&mut self, id: CoroId) {
        let Some(mut co) = self.coroutines.try_remove(id.0) else {
            return;
        };

        for handle in co.observers.all_handles() {
            if co.observers.revoke(handle).is_some() {
                co.waits = co.waits.saturating_sub(1);
            }
        }
        debug_assert!(co.observers.is_empty());

        self.services.timer_hub.borrow_mut().destroy_all_for(id);

        {
            let mut table = self.services.requests.lock();
            for request in co.async_requests.drain(..) {
                if table.cancel(request) {
                    table.reap(request);
                }
                self.callbacks.remove(&request);
                self.parked_results.remove(&request);
            }
        }

        if let Some(exception) = &co.exception {
            // an unclaimed exception dumps a diagnostic but never aborts
            log::error!(
                "coroutine {id:?} terminated with unhandled exception {} at {} ({})",
                exception.atom(),
                exception.callsite,
                exception.error.message,
            );
        }

        log::debug!("coroutine {id:?} terminated");
        self.outcomes.push(CoroutineOutcome {
            id,
            result: co.result.clone(),
            exception: co.exception.clone(),
            html: co.html(),
        });
    }

    // ------------------------------------------------------- requests

    /// Issue a request on behalf of `coro`. The returned handle goes to
    /// whatever thread does the work; the callback stays here and runs on
    /// completion.
    pub fn issue_request(
        &mut self,
        coro: CoroId,
        kind: RequestKind,
        callback: RequestCallback,
    ) -> RequestHandle {
        let id = self.services.requests.lock().issue(kind, coro);
        if kind == RequestKind::Async {
            if let Some(co) = self.coroutines.get_mut(coro.0) {
                co.async_requests.push(id);
            }
        }
        self.callbacks.insert(id, callback);
        RequestHandle {
            id,
            table: self.services.requests.clone(),
            proxy: self.services.proxy.clone(),
        }
    }

    /// Cancel a request that has not been picked up yet.
    pub fn cancel_request(&mut self, id: RequestId) {
        let mut table = self.services.requests.lock();
        if table.cancel(id) {
            table.reap(id);
            drop(table);
            self.callbacks.remove(&id);
            self.parked_results.remove(&id);
        }
    }

    fn handle_request_done(
        &mut self,
        id: RequestId,
        result: std::result::Result<serde_json::Value, String>,
    ) {
        let record = {
            let mut table = self.services.requests.lock();
            match table.state(id) {
                None => return,
                Some(RequestState::Cancelled) | Some(RequestState::Dying) => {
                    // the cancel path won: release without a callback
                    table.reap(id);
                    table.release(id);
                    drop(table);
                    self.callbacks.remove(&id);
                    log::trace!("request {id:?} released after cancellation");
                    return;
                }
                _ => table.get(id).cloned(),
            }
        };
        let Some(record) = record else {
            return;
        };

        let value = result
            .map(|json| Variant::from_json(&json))
            .map_err(|message| HvmlError::new(ErrorKind::ExternalFailure, message));

        // SYNC results only land while their frame is current; otherwise
        // the request hibernates until the frame comes back
        if let RequestKind::Sync { frame_depth } = record.kind {
            let current_depth = self
                .coroutines
                .get(record.coro.0)
                .map(|co| co.depth())
                .unwrap_or(0);
            if current_depth != frame_depth {
                let mut table = self.services.requests.lock();
                table.activate(id);
                table.hibernate(id);
                drop(table);
                log::trace!("request {id:?} hibernating until its frame returns");
                self.parked_results
                    .insert(id, (record.coro, frame_depth, value));
                return;
            }
        }

        {
            let mut table = self.services.requests.lock();
            table.complete(id);
            table.release(id);
        }
        self.run_callback(id, record.coro, value);
    }

    /// Re-check parked sync results after every tick; a result delivers
    /// once its frame depth is current again.
    fn deliver_parked_results(&mut self) {
        if self.parked_results.is_empty() {
            return;
        }
        let ready: Vec<RequestId> = self
            .parked_results
            .iter()
            .filter(|(_, (coro, depth, _))| {
                self.coroutines
                    .get(coro.0)
                    .map(|co| co.depth() == *depth)
                    .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();

        for id in ready {
            let Some((coro, _, value)) = self.parked_results.remove(&id) else {
                continue;
            };
            {
                let mut table = self.services.requests.lock();
                table.wake(id);
                table.complete(id);
                table.release(id);
            }
            self.run_callback(id, coro, value);
        }
    }

    fn run_callback(&mut self, id: RequestId, coro: CoroId, value: Result<Variant>) {
        let Some(callback) = self.callbacks.remove(&id) else {
            return;
        };
        let Some(co) = self.coroutines.get_mut(coro.0) else {
            return;
        };
        callback(co, value);
        if co.state == CoroutineState::Wait {
            co.state = CoroutineState::Ready;
        }
    }
}
