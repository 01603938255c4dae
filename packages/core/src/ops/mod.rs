//! Per-tag element operations: the four-phase vtable.
//!
//! Every tag implements [`ElementOps`]; the scheduler drives exactly one
//! phase per tick. Ops run against an [`OpsCtx`] that pairs the coroutine
//! with the heap's shared services, so no ops table or renderer handle is
//! ever global - the table lives on the heap and travels by reference.

mod container;
mod control;
mod data;
mod flow;
mod foreign;
mod observe_tag;
mod update;

pub use foreign::ForeignOps;

use crate::coroutine::Coroutine;
use crate::edom::elements_variant;
use crate::error::{HvmlError, Result};
use crate::eval::{eval_content, eval_in_top};
use crate::heap::Services;
use crate::runloop::{LocalMsg, MessageRecord};
use crate::stack::{Frame, FrameKind};
use hvml_dom::DomId;
use hvml_renderer::RendererError;
use hvml_variant::{Atom, Variant};
use hvml_vdom::{AttrOp, ContentPart, TagName, VcmNode, VNodeData, VNodeId};
use std::rc::Rc;

/// What one `select_child` transition produced.
pub enum SelectOutcome {
    /// Push a frame for this element child.
    Push(VNodeId),
    /// A content or comment child was consumed inline; stay in
    /// `SELECT_CHILD`.
    Handled,
    /// No more children; move to `ON_POPPING`.
    Done,
}

pub trait ElementOps {
    fn name(&self) -> &'static str;

    /// The frame just became current. `Ok(false)` skips straight to
    /// popping.
    fn after_pushed(&self, _ctx: &mut OpsCtx<'_>) -> Result<bool> {
        Ok(true)
    }

    /// Advance the child cursor by one step.
    fn select_child(&self, ctx: &mut OpsCtx<'_>) -> Result<SelectOutcome> {
        default_select_child(ctx)
    }

    /// Should the frame actually pop? `Ok(false)` triggers `rerun`.
    fn on_popping(&self, _ctx: &mut OpsCtx<'_>) -> Result<bool> {
        Ok(true)
    }

    /// Re-arm for another round. `Ok(true)` transitions back to
    /// `SELECT_CHILD`; `Ok(false)` gives up and pops.
    fn rerun(&self, _ctx: &mut OpsCtx<'_>) -> Result<bool> {
        Ok(false)
    }
}

/// The ops dispatch table, one instance per heap.
pub struct OpsTable {
    hvml: Rc<dyn ElementOps>,
    head: Rc<dyn ElementOps>,
    body: Rc<dyn ElementOps>,
    init: Rc<dyn ElementOps>,
    observe: Rc<dyn ElementOps>,
    matching: Rc<dyn ElementOps>,
    test: Rc<dyn ElementOps>,
    differ: Rc<dyn ElementOps>,
    catch: Rc<dyn ElementOps>,
    inherit: Rc<dyn ElementOps>,
    iterate: Rc<dyn ElementOps>,
    choose: Rc<dyn ElementOps>,
    except: Rc<dyn ElementOps>,
    exit: Rc<dyn ElementOps>,
    forget: Rc<dyn ElementOps>,
    update: Rc<dyn ElementOps>,
    load: Rc<dyn ElementOps>,
    define: Rc<dyn ElementOps>,
    back: Rc<dyn ElementOps>,
    call: Rc<dyn ElementOps>,
    include: Rc<dyn ElementOps>,
    reduce: Rc<dyn ElementOps>,
    sort: Rc<dyn ElementOps>,
    bind: Rc<dyn ElementOps>,
    archetype: Rc<dyn ElementOps>,
    foreign: Rc<dyn ElementOps>,
}

impl Default for OpsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OpsTable {
    pub fn new() -> Self {
        OpsTable {
            hvml: Rc::new(container::HvmlOps),
            head: Rc::new(container::HeadOps),
            body: Rc::new(container::BodyOps),
            init: Rc::new(data::InitOps),
            observe: Rc::new(observe_tag::ObserveOps),
            matching: Rc::new(control::MatchOps),
            test: Rc::new(control::TestOps),
            differ: Rc::new(control::DifferOps),
            catch: Rc::new(flow::CatchOps),
            inherit: Rc::new(flow::InheritOps),
            iterate: Rc::new(control::IterateOps),
            choose: Rc::new(control::ChooseOps),
            except: Rc::new(flow::ExceptOps),
            exit: Rc::new(flow::ExitOps),
            forget: Rc::new(observe_tag::ForgetOps),
            update: Rc::new(update::UpdateOps),
            load: Rc::new(flow::LoadOps),
            define: Rc::new(data::DefineOps),
            back: Rc::new(flow::BackOps),
            call: Rc::new(flow::CallOps),
            include: Rc::new(flow::IncludeOps),
            reduce: Rc::new(control::ReduceOps),
            sort: Rc::new(control::SortOps),
            bind: Rc::new(data::BindOps),
            archetype: Rc::new(data::ArchetypeOps),
            foreign: Rc::new(foreign::ForeignOps),
        }
    }

    pub fn for_tag(&self, tag: &TagName) -> Rc<dyn ElementOps> {
        match tag {
            TagName::Hvml => self.hvml.clone(),
            TagName::Head => self.head.clone(),
            TagName::Body => self.body.clone(),
            TagName::Init => self.init.clone(),
            TagName::Observe => self.observe.clone(),
            TagName::Match => self.matching.clone(),
            TagName::Test => self.test.clone(),
            TagName::Differ => self.differ.clone(),
            TagName::Catch => self.catch.clone(),
            TagName::Inherit => self.inherit.clone(),
            TagName::Iterate => self.iterate.clone(),
            TagName::Choose => self.choose.clone(),
            TagName::Except => self.except.clone(),
            TagName::Exit => self.exit.clone(),
            TagName::Forget => self.forget.clone(),
            TagName::Update => self.update.clone(),
            TagName::Load => self.load.clone(),
            TagName::Define => self.define.clone(),
            TagName::Back => self.back.clone(),
            TagName::Call => self.call.clone(),
            TagName::Include => self.include.clone(),
            TagName::Reduce => self.reduce.clone(),
            TagName::Sort => self.sort.clone(),
            TagName::Bind => self.bind.clone(),
            TagName::Archetype => self.archetype.clone(),
            TagName::Foreign(_) => self.foreign.clone(),
        }
    }
}

/// Everything a phase callback can reach: the coroutine plus the heap's
/// shared services.
pub struct OpsCtx<'a> {
    pub co: &'a mut Coroutine,
    pub services: &'a Services,
}

impl<'a> OpsCtx<'a> {
    pub fn frame(&self) -> &Frame {
        self.co.frame().expect("ops ran without a frame")
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        self.co.frame_mut().expect("ops ran without a frame")
    }

    pub fn parent_frame_mut(&mut self) -> Option<&mut Frame> {
        let depth = self.co.stack.len();
        if depth >= 2 {
            self.co.stack.get_mut(depth - 2)
        } else {
            None
        }
    }

    pub fn pos(&self) -> Option<VNodeId> {
        self.frame().pos
    }

    pub fn tag(&self) -> Option<TagName> {
        let pos = self.pos()?;
        self.co.doc.element(pos).map(|el| el.tag.clone())
    }

    /// The unevaluated expression of an attribute.
    pub fn attr_expr(&self, name: &str) -> Option<VcmNode> {
        let pos = self.pos()?;
        self.co
            .doc
            .element(pos)?
            .attr(name)
            .and_then(|attr| attr.value.clone())
    }

    pub fn attr_op(&self, name: &str) -> Option<AttrOp> {
        let pos = self.pos()?;
        self.co.doc.element(pos)?.attr(name).map(|attr| attr.op)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.pos()
            .and_then(|pos| self.co.doc.element(pos))
            .map(|el| el.has_flag(name))
            .unwrap_or(false)
    }

    /// Evaluate one attribute in the current frame.
    pub fn eval_attr(&self, name: &str) -> Result<Option<Variant>> {
        match self.attr_expr(name) {
            Some(expr) => {
                let silently = self.frame().silently;
                Ok(Some(eval_in_top(self.co, &expr, silently)?))
            }
            None => Ok(None),
        }
    }

    pub fn require_attr(&self, name: &str) -> Result<Variant> {
        self.eval_attr(name)?.ok_or_else(|| {
            HvmlError::bad_arg(format!(
                "<{}> requires a {name} attribute",
                self.tag().map(|t| t.as_str().to_owned()).unwrap_or_default()
            ))
        })
    }

    /// Evaluate every attribute into the frame's `attr_vars` object.
    pub fn eval_attrs_object(&mut self) -> Result<Variant> {
        let pos = self.pos();
        let object = Variant::object();
        if let Some(pos) = pos {
            let doc = self.co.doc.clone();
            if let Some(el) = doc.element(pos) {
                let silently = self.frame().silently;
                for attr in &el.attrs {
                    let value = match &attr.value {
                        Some(expr) => eval_in_top(self.co, expr, silently)?,
                        None => Variant::boolean(true),
                    };
                    object.object_set(attr.name.clone(), value)?;
                }
            }
        }
        self.frame_mut().attr_vars = Some(object.clone());
        Ok(object)
    }

    /// The element's single data-content child, if any (used by `<init>`
    /// and friends to take their payload from content).
    pub fn content_parts(&self) -> Option<Vec<ContentPart>> {
        let pos = self.pos()?;
        let doc = &self.co.doc;
        doc.children(pos).iter().find_map(|child| match doc.data(*child) {
            VNodeData::Content(parts) => Some(parts.clone()),
            _ => None,
        })
    }

    /// Evaluate data content: a lone literal parses as an expression so
    /// `<init as 'x'>[1, 2]</init>` yields an array, not a string.
    pub fn eval_data_content(&self, parts: &[ContentPart]) -> Result<Variant> {
        let silently = self.frame().silently;
        if let [ContentPart::Literal(text)] = parts {
            let expr = hvml_vdom::parse_expression(text.trim())?;
            return eval_in_top(self.co, &expr, silently);
        }
        eval_content(self.co, parts, silently)
    }

    pub fn set_result(&mut self, value: Variant) {
        self.frame_mut().result = value;
    }

    pub fn set_child_input(&mut self, value: Variant) {
        self.frame_mut().child_input = Some(value);
    }

    /// Recompute `@` from the current output-DOM insertion point.
    pub fn refresh_at(&mut self) {
        let element = self.frame().edom_element;
        self.frame_mut()
            .set_symbol('@', elements_variant(vec![element]));
    }

    // ------------------------------------------------ output-DOM helpers

    /// The renderer page handle, once attached. Before attachment the
    /// stack is rebuilding without a renderer and edits stay local.
    fn page(&self) -> Option<u64> {
        self.co.page
    }

    pub fn append_element(&mut self, tag: &str) -> Result<DomId> {
        let parent = self.frame().edom_element;
        let id = self.co.edom.borrow_mut().append_element(parent, tag)?;
        if let Some(page) = self.page() {
            let html = self.co.edom.borrow().outer_html(id);
            self.renderer_emit(|r| r.append_child(page, parent.0 as u64, &html))?;
        }
        Ok(id)
    }

    pub fn append_text(&mut self, text: &str) -> Result<()> {
        let parent = self.frame().edom_element;
        self.co.edom.borrow_mut().append_content(parent, text)?;
        if let Some(page) = self.page() {
            self.renderer_emit(|r| r.append_content(page, parent.0 as u64, text))?;
        }
        Ok(())
    }

    pub fn displace_text(&mut self, target: DomId, text: &str) -> Result<()> {
        self.co.edom.borrow_mut().displace_content(target, text)?;
        if let Some(page) = self.page() {
            self.renderer_emit(|r| r.displace_content(page, target.0 as u64, text))?;
        }
        Ok(())
    }

    pub fn set_dom_attribute(&mut self, target: DomId, key: &str, value: &str) -> Result<()> {
        self.co.edom.borrow_mut().set_attribute(target, key, value)?;
        if let Some(page) = self.page() {
            self.renderer_emit(|r| r.update_element_property(page, target.0 as u64, key, value))?;
        }
        Ok(())
    }

    /// Parse `html` inside a hidden wrapper and graft its children under
    /// `target`, in order.
    pub fn add_child_chunk(&mut self, target: DomId, html: &str) -> Result<()> {
        let fragment = hvml_dom::parse_fragment(html);
        self.co.edom.borrow_mut().graft(target, &fragment)?;
        if let Some(page) = self.page() {
            self.renderer_emit(|r| r.append_child(page, target.0 as u64, html))?;
        }
        Ok(())
    }

    /// Replace the children of `target` with the parsed chunk.
    pub fn set_child_chunk(&mut self, target: DomId, html: &str) -> Result<()> {
        let fragment = hvml_dom::parse_fragment(html);
        {
            let mut edom = self.co.edom.borrow_mut();
            edom.remove_children(target)?;
            edom.graft(target, &fragment)?;
        }
        if let Some(page) = self.page() {
            self.renderer_emit(|r| r.displace_child(page, target.0 as u64, html))?;
        }
        Ok(())
    }

    fn renderer_emit(
        &self,
        emit: impl FnOnce(&hvml_renderer::RendererLink) -> std::result::Result<(), RendererError>,
    ) -> Result<()> {
        emit(&self.services.renderer)?;
        Ok(())
    }

    // --------------------------------------------------------- messaging

    /// Post a typed message to this coroutine's observers through the
    /// runloop.
    pub fn dispatch(&self, source: Variant, event: &str, sub: Option<String>, extra: Variant) {
        self.services.runloop.post(LocalMsg::Message(MessageRecord {
            target: self.co.id,
            source,
            event: Atom::intern(event),
            sub,
            extra,
        }));
    }
}

/// Bind a new frame for `child` on top of the current one.
pub fn push_child_frame(co: &mut Coroutine, table: &OpsTable, child: VNodeId) {
    let doc = co.doc.clone();
    let element = doc.element(child).expect("pushed a non-element child");
    let ops = table.for_tag(&element.tag);
    let silently = element.has_flag("silently");

    let parent = co.stack.last().expect("push_child_frame without a parent");
    let input = parent.child_input.clone();
    let edom_element = parent.edom_element;

    let mut frame = Frame::new(FrameKind::Normal, Some(child), child, edom_element, ops);
    frame.silently = silently;
    frame.set_symbol('<', input.unwrap_or_else(Variant::undefined));
    frame.set_symbol('@', elements_variant(vec![edom_element]));
    frame.set_symbol('!', Variant::object());
    co.stack.push(frame);
}

/// The default child walk shared by every container-ish tag.
pub fn default_select_child(ctx: &mut OpsCtx<'_>) -> Result<SelectOutcome> {
    match ctx.frame().pos {
        Some(pos) => select_from(ctx, pos),
        None => Ok(SelectOutcome::Done),
    }
}

/// Walk the children of `parent_node` from the frame's cursor.
///
/// Comments are skipped, content is consumed inline, elements push. While
/// an unclaimed exception is pending only `<catch>`/`<except>` children
/// are eligible - everything else unwinds past; symmetrically, handler
/// tags never run in normal flow.
pub fn select_from(ctx: &mut OpsCtx<'_>, parent_node: VNodeId) -> Result<SelectOutcome> {
    let doc = ctx.co.doc.clone();
    loop {
        let cursor = ctx.frame().child_cursor;
        let Some(&child) = doc.children(parent_node).get(cursor) else {
            return Ok(SelectOutcome::Done);
        };
        ctx.frame_mut().child_cursor = cursor + 1;

        let unwinding = ctx.co.exception.is_some() && ctx.co.exception_claimed.is_none();
        match doc.data(child) {
            VNodeData::Comment(_) | VNodeData::Document => continue,
            VNodeData::Content(parts) => {
                if unwinding {
                    continue;
                }
                let parts = parts.clone();
                handle_content(ctx, &parts)?;
                return Ok(SelectOutcome::Handled);
            }
            VNodeData::Element(el) => {
                let is_handler = matches!(el.tag, TagName::Catch | TagName::Except);
                if unwinding != is_handler {
                    continue;
                }
                return Ok(SelectOutcome::Push(child));
            }
        }
    }
}

/// Inline content: foreign-ish frames append to the output DOM, verb
/// frames keep the value as their result.
fn handle_content(ctx: &mut OpsCtx<'_>, parts: &[ContentPart]) -> Result<()> {
    let silently = ctx.frame().silently;
    let value = eval_content(ctx.co, parts, silently)?;
    let renders = matches!(
        ctx.tag(),
        Some(TagName::Foreign(_)) | Some(TagName::Body) | Some(TagName::Head)
    );
    if renders {
        // a silenced failure evaluates to undefined; render nothing
        if !value.is_undefined() {
            ctx.append_text(&value.to_string())?;
        }
    } else {
        ctx.set_result(value.clone());
        ctx.frame_mut().set_symbol('?', value);
    }
    Ok(())
}

/// Apply an attribute assignment operator to an existing value.
pub fn apply_attr_op(op: AttrOp, old: Option<&str>, value: &Variant) -> Result<String> {
    let numeric = |old: Option<&str>| -> f64 {
        old.and_then(|t| t.trim().parse::<f64>().ok()).unwrap_or(0.0)
    };
    let format_num = |n: f64| {
        if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
            format!("{}", n as i64)
        } else {
            format!("{n}")
        }
    };

    Ok(match op {
        AttrOp::Replace => value.to_string(),
        AttrOp::Add => format_num(numeric(old) + value.coerce_number()?),
        AttrOp::Subtract => format_num(numeric(old) - value.coerce_number()?),
        AttrOp::Remainder => {
            let rhs = value.coerce_number()?;
            if rhs == 0.0 {
                return Err(HvmlError::bad_arg("remainder by zero"));
            }
            format_num(numeric(old) % rhs)
        }
        AttrOp::RegexReplace => {
            let pattern = value.to_string();
            let regex = regex::Regex::new(&pattern)
                .map_err(|err| HvmlError::bad_arg(format!("bad pattern: {err}")))?;
            regex.replace_all(old.unwrap_or(""), "").into_owned()
        }
        AttrOp::Prepend => format!("{}{}", value, old.unwrap_or("")),
        AttrOp::Append => format!("{}{}", old.unwrap_or(""), value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_op_semantics() {
        let one = Variant::longint(1);
        assert_eq!(apply_attr_op(AttrOp::Replace, Some("x"), &one).unwrap(), "1");
        assert_eq!(apply_attr_op(AttrOp::Add, Some("41"), &one).unwrap(), "42");
        assert_eq!(apply_attr_op(AttrOp::Subtract, None, &one).unwrap(), "-1");
        assert_eq!(
            apply_attr_op(AttrOp::Remainder, Some("7"), &Variant::longint(4)).unwrap(),
            "3"
        );
        assert_eq!(
            apply_attr_op(AttrOp::Prepend, Some("bar"), &Variant::string("foo")).unwrap(),
            "foobar"
        );
        assert_eq!(
            apply_attr_op(AttrOp::Append, Some("foo"), &Variant::string("bar")).unwrap(),
            "foobar"
        );
        assert_eq!(
            apply_attr_op(AttrOp::RegexReplace, Some("a1b2"), &Variant::string("[0-9]")).unwrap(),
            "ab"
        );
        assert!(apply_attr_op(AttrOp::Remainder, Some("1"), &Variant::longint(0)).is_err());
    }
}
