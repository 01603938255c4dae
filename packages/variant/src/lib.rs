//! Tagged dynamic values for the hvml interpreter.
//!
//! Every value an hvml document touches - attribute results, scoped
//! variables, message payloads - is a [`Variant`]: a cheaply-cloneable,
//! reference-counted handle to a tagged payload. Containers (array, object,
//! set) notify registered post-listeners after every structural change,
//! which is the mechanism the interpreter's observers and `$TIMERS` bridge
//! are built on.
//!
//! Cloning a `Variant` bumps the reference count; dropping the last clone
//! releases the payload (and runs the native `on_release` hook if the kind
//! is native). There is no garbage collector - cycles are broken explicitly
//! by the observer layer.

mod atom;
mod container;
mod error;
mod listener;
mod native;
mod serialize;
mod value;

pub use atom::Atom;
pub use container::SetData;
pub use error::VariantError;
pub use listener::{ListenerCallback, ListenerHandle};
pub use native::{NativeMethod, NativeOps};
pub use value::{DynamicOps, Variant, VariantKind};

/// Event atom fired after an element is inserted into a container.
pub fn grow_atom() -> Atom {
    Atom::intern("grow")
}

/// Event atom fired after an element is removed from a container.
pub fn shrink_atom() -> Atom {
    Atom::intern("shrink")
}

/// Event atom fired after an element is displaced in place.
pub fn change_atom() -> Atom {
    Atom::intern("change")
}
