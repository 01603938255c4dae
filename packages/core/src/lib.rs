//! The hvml interpreter core.
//!
//! An HVML document parses (via `hvml-vdom`) into an immutable tree; this
//! crate executes it: a cooperative scheduler advances coroutines one
//! frame-phase at a time, frames carry the eight symbol variables and the
//! per-tag context, observers park coroutines until messages wake them,
//! and every output-DOM mutation is mirrored to the renderer bridge.

pub(crate) mod builtins;
pub(crate) mod coroutine;
pub(crate) mod edom;
pub(crate) mod error;
pub(crate) mod eval;
pub(crate) mod heap;
pub(crate) mod observe;
pub(crate) mod ops;
pub(crate) mod request;
pub(crate) mod runloop;
pub(crate) mod schedule;
pub(crate) mod scope;
pub(crate) mod stack;
pub(crate) mod timers;

pub(crate) mod innerlude {
    pub use hvml_variant::{Atom, Variant};

    pub use crate::builtins::make_builtins;
    pub use crate::coroutine::{CoroId, Coroutine, CoroutineState, Stage};
    pub use crate::edom::{collection_of, elements_variant, ElementCollection};
    pub use crate::error::{ErrorKind, Exception, HvmlError, Result};
    pub use crate::eval::{eval_content, eval_in_top, FrameEvalCtx};
    pub use crate::heap::{
        CoroutineOutcome, Heap, RequestCallback, RunOutcome, Services,
    };
    pub use crate::observe::{
        Observer, ObserverHandle, ObserverList, ObserverLists, SubMatch,
    };
    pub use crate::ops::{
        apply_attr_op, default_select_child, push_child_frame, ElementOps, ForeignOps, OpsCtx,
        OpsTable, SelectOutcome,
    };
    pub use crate::request::{
        RequestHandle, RequestId, RequestKind, RequestState, RequestTable,
    };
    pub use crate::runloop::{
        LocalMsg, MessageRecord, Polled, RemoteMsg, RunLoop, RunLoopProxy,
    };
    pub use crate::scope::ScopedVariables;
    pub use crate::stack::{
        symbol_index, Frame, FrameKind, NextStep, Preemptor, SYMBOLS,
    };
    pub use crate::timers::{make_timers_variant, DueTimer, TimerHub};
}

pub use innerlude::*;

pub mod prelude {
    pub use crate::innerlude::{
        CoroId, Coroutine, CoroutineOutcome, CoroutineState, ErrorKind, Exception, Heap,
        HvmlError, RunOutcome, Stage,
    };
    pub use hvml_renderer::{RecordingTransport, RendererLink};
    pub use hvml_variant::Variant;
    pub use hvml_vdom::parse_document;
}
