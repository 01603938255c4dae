//! The unit of interpretation: one coroutine per running document.

use crate::error::Exception;
use crate::observe::ObserverLists;
use crate::request::RequestId;
use crate::scope::ScopedVariables;
use crate::stack::Frame;
use hvml_dom::DomTree;
use hvml_variant::Variant;
use hvml_vdom::{VDocument, VNodeId};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Index of a coroutine in the heap's arena. Not unique across time; a
/// terminated coroutine's slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoroId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineState {
    Ready,
    /// Only ever observed mid-step; a coroutine left in `Run` across
    /// ticks indicates an installed preemptor.
    Run,
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Walking the document top to bottom for the first time.
    FirstRound,
    /// Parked-and-woken operation driven by observers.
    EventLoop,
}

pub struct Coroutine {
    pub id: CoroId,
    pub state: CoroutineState,
    pub stage: Stage,
    /// Number of live observer records; non-zero parks the coroutine at
    /// quiescence instead of terminating it.
    pub waits: usize,

    pub doc: Rc<VDocument>,
    pub edom: Rc<RefCell<DomTree>>,
    pub scoped: ScopedVariables,
    pub stack: Vec<Frame>,

    pub exception: Option<Exception>,
    /// Stack depth of the `<catch>` frame that claimed the pending
    /// exception, if any.
    pub exception_claimed: Option<usize>,

    pub observers: ObserverLists,
    /// Document-level built-ins (`$L`, `$SYSTEM`, ..., `$TIMERS`).
    pub builtins: Variant,
    /// The live `$TIMERS` set (also reachable through `builtins`).
    pub timers_var: Variant,

    pub async_requests: Vec<RequestId>,

    /// Set by `<exit>`; the scheduler unwinds and terminates.
    pub exiting: bool,
    pub result: Option<Variant>,

    /// Renderer page handle once attached.
    pub page: Option<u64>,

    /// `<archetype name ...>` templates, by name.
    pub archetypes: FxHashMap<String, VNodeId>,
    /// `<define as ...>` groups, by name.
    pub groups: FxHashMap<String, VNodeId>,

    /// Last value seen per observer for change-suppression: equal values
    /// do not re-dispatch `change`.
    pub observed_cache: FxHashMap<(usize, usize), Variant>,

    /// `<back>` in flight: `(target stack depth, value)`.
    pub back_request: Option<(usize, Variant)>,
}

impl Coroutine {
    pub fn new(
        id: CoroId,
        doc: Rc<VDocument>,
        edom: Rc<RefCell<DomTree>>,
        builtins: Variant,
        timers_var: Variant,
    ) -> Self {
        Coroutine {
            id,
            state: CoroutineState::Ready,
            stage: Stage::FirstRound,
            waits: 0,
            doc,
            edom,
            scoped: ScopedVariables::default(),
            stack: Vec::new(),
            exception: None,
            exception_claimed: None,
            observers: ObserverLists::default(),
            builtins,
            timers_var,
            async_requests: Vec::new(),
            exiting: false,
            result: None,
            page: None,
            archetypes: FxHashMap::default(),
            groups: FxHashMap::default(),
            observed_cache: FxHashMap::default(),
            back_request: None,
        }
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.stack.last()
    }

    pub fn frame_mut(&mut self) -> Option<&mut Frame> {
        self.stack.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Serialized output document.
    pub fn html(&self) -> String {
        let edom = self.edom.borrow();
        edom.outer_html(edom.root())
    }
}
