//! The mutable output DOM.
//!
//! Coroutines build their result document in a [`DomTree`]: a slab arena of
//! element and text nodes addressed by [`DomId`]. Ids are stable until the
//! node is removed, which is what lets frames hold their insertion point
//! across phases and lets the renderer bridge refer to nodes by handle.
//!
//! The tree itself knows nothing about the renderer; the interpreter's
//! edom helpers pair every mutation here with the matching renderer
//! message.

mod fragment;
mod serialize;
mod tree;

pub use fragment::{parse_fragment, Fragment, FragmentNode};
pub use serialize::escape_text;
pub use tree::{DomError, DomId, DomNodeData, DomTree};
