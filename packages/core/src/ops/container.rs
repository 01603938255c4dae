//! `<hvml>`, `<head>`, `<body>`: the structural tags.

use super::{ElementOps, OpsCtx};
use crate::error::Result;

pub struct HvmlOps;

impl ElementOps for HvmlOps {
    fn name(&self) -> &'static str {
        "hvml"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        // resolves `target` and friends into attr_vars for `$HVML`-style
        // introspection; the document root renders into the tree root
        ctx.eval_attrs_object()?;
        ctx.refresh_at();
        Ok(true)
    }
}

pub struct HeadOps;

impl ElementOps for HeadOps {
    fn name(&self) -> &'static str {
        "head"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        retarget(ctx, "head");
        Ok(true)
    }
}

pub struct BodyOps;

impl ElementOps for BodyOps {
    fn name(&self) -> &'static str {
        "body"
    }

    fn after_pushed(&self, ctx: &mut OpsCtx<'_>) -> Result<bool> {
        retarget(ctx, "body");
        Ok(true)
    }
}

/// Point the frame's insertion point at the output document's `<head>` or
/// `<body>`.
fn retarget(ctx: &mut OpsCtx<'_>, tag: &str) {
    let found = {
        let edom = ctx.co.edom.borrow();
        edom.find_by_tag(edom.root(), tag)
    };
    if let Some(id) = found {
        ctx.frame_mut().edom_element = id;
        ctx.refresh_at();
    }
}
