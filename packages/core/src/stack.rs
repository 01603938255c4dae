//! Execution frames and symbol variables.
//!
//! A coroutine's stack is a vector of [`Frame`]s; the top frame is the one
//! the scheduler advances. Each frame owns the eight punctuation-named
//! symbol variables and its tag's per-frame context. Child frames inherit
//! no symbols - every frame initializes its own on push.

use crate::error::{HvmlError, Result};
use crate::ops::OpsCtx;
use hvml_dom::DomId;
use hvml_variant::Variant;
use hvml_vdom::VNodeId;
use std::any::Any;
use std::rc::Rc;

/// The eight symbol variables, in slot order.
pub const SYMBOLS: [char; 8] = ['<', '@', '!', '?', '%', '^', '&', ':'];

/// Slot index of a symbol character.
pub fn symbol_index(symbol: char) -> Option<usize> {
    SYMBOLS.iter().position(|&s| s == symbol)
}

/// Where a frame is in its four-phase life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    AfterPushed,
    SelectChild,
    Rerun,
    OnPopping,
}

/// `Normal` frames execute a vDOM element; `Pseudo` frames are synthetic,
/// created by the observer path to run a matched handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Normal,
    Pseudo,
}

/// A one-shot transition override. When installed, the scheduler runs it
/// instead of the phase dispatcher once, then clears it.
pub type Preemptor = Box<dyn FnOnce(&mut OpsCtx<'_>) -> Result<()>>;

pub struct Frame {
    pub kind: FrameKind,
    /// The vDOM element being executed (`None` only for pseudo frames
    /// whose position was torn down).
    pub pos: Option<VNodeId>,
    /// The node scoped-variable lookup starts from.
    pub scope: VNodeId,
    /// Current output-DOM insertion point.
    pub edom_element: DomId,
    /// Per-tag context, downcast by the owning ops.
    pub ctxt: Option<Box<dyn Any>>,
    /// Evaluated attribute values, as an object variant.
    pub attr_vars: Option<Variant>,
    /// Value returned by the most recent completed child frame.
    pub result_from_child: Option<Variant>,
    /// The input this frame hands to children it pushes (their `<`).
    pub child_input: Option<Variant>,
    /// This frame's own result, handed to the parent on pop.
    pub result: Variant,
    symbols: [Variant; 8],
    pub next_step: NextStep,
    /// Errors in this frame are demoted to warnings.
    pub silently: bool,
    pub preemptor: Option<Preemptor>,
    pub ops: Rc<dyn crate::ops::ElementOps>,
    /// Cursor of the default child walk.
    pub child_cursor: usize,
}

impl Frame {
    pub fn new(
        kind: FrameKind,
        pos: Option<VNodeId>,
        scope: VNodeId,
        edom_element: DomId,
        ops: Rc<dyn crate::ops::ElementOps>,
    ) -> Self {
        Frame {
            kind,
            pos,
            scope,
            edom_element,
            ctxt: None,
            attr_vars: None,
            result_from_child: None,
            child_input: None,
            result: Variant::undefined(),
            symbols: std::array::from_fn(|_| Variant::undefined()),
            next_step: NextStep::AfterPushed,
            silently: false,
            preemptor: None,
            ops,
            child_cursor: 0,
        }
    }

    /// Set a symbol slot. The previous value is dropped (unref) before
    /// the new one is stored.
    pub fn set_symbol(&mut self, symbol: char, value: Variant) {
        if let Some(index) = symbol_index(symbol) {
            self.symbols[index] = value;
        } else {
            log::warn!("unknown symbol variable {symbol:?}");
        }
    }

    pub fn get_symbol(&self, symbol: char) -> Option<Variant> {
        symbol_index(symbol).map(|index| self.symbols[index].clone())
    }

    /// Increment `%`, the iteration counter.
    pub fn inc_percent(&mut self) {
        let current = self
            .get_symbol('%')
            .and_then(|v| v.coerce_i64().ok())
            .unwrap_or(0)
            .max(0) as u64;
        self.set_symbol('%', Variant::ulongint(current + 1));
    }

    /// Record a completed child's result: `result_from_child` and `?`.
    pub fn take_child_result(&mut self, result: Variant) {
        self.set_symbol('?', result.clone());
        self.result_from_child = Some(result);
    }

    /// Downcast the per-tag context.
    pub fn ctxt_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.ctxt.as_mut().and_then(|c| c.downcast_mut::<T>())
    }

    pub fn ctxt_ref<T: 'static>(&self) -> Option<&T> {
        self.ctxt.as_ref().and_then(|c| c.downcast_ref::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::ForeignOps;
    use hvml_dom::DomId;

    fn test_frame() -> Frame {
        Frame::new(
            FrameKind::Normal,
            None,
            hvml_vdom::VNodeId(0),
            DomId(0),
            Rc::new(ForeignOps),
        )
    }

    #[test]
    fn symbols_start_undefined_and_round_trip() {
        let mut frame = test_frame();
        for symbol in SYMBOLS {
            assert!(frame.get_symbol(symbol).unwrap().is_undefined());
        }

        let value = Variant::string("x");
        frame.set_symbol('?', value.clone());
        assert!(frame.get_symbol('?').unwrap().ptr_eq(&value));
    }

    #[test]
    fn percent_counts_from_zero() {
        let mut frame = test_frame();
        frame.set_symbol('%', Variant::ulongint(0));
        frame.inc_percent();
        frame.inc_percent();
        assert_eq!(frame.get_symbol('%').unwrap().coerce_i64().unwrap(), 2);
    }

    #[test]
    fn setting_a_symbol_releases_the_old_value() {
        let mut frame = test_frame();
        let old = Variant::array(vec![]);
        frame.set_symbol('!', old.clone());
        assert_eq!(old.ref_count(), 2);
        frame.set_symbol('!', Variant::undefined());
        assert_eq!(old.ref_count(), 1);
    }
}
