use crate::{Atom, Variant, VariantError};
use std::rc::Rc;

/// A bound method on a native entity: `(entity, args) -> value`.
pub type NativeMethod = Rc<dyn Fn(&Variant, &[Variant]) -> Result<Variant, VariantError>>;

/// Per-kind callbacks of a native variant.
///
/// A native variant wraps host-side state behind this vtable. All methods
/// are optional; the defaults behave like an entity with no properties
/// that accepts observers silently.
pub trait NativeOps: 'static {
    /// A short name for diagnostics.
    fn name(&self) -> &'static str {
        "native"
    }

    /// Concrete-type access for hosts that know their own entities.
    fn as_any(&self) -> Option<&dyn std::any::Any> {
        None
    }

    /// Resolve a readable property to a bound method.
    fn property_getter(&self, _name: &str) -> Option<NativeMethod> {
        None
    }

    /// Resolve a writable property to a bound method.
    fn property_setter(&self, _name: &str) -> Option<NativeMethod> {
        None
    }

    /// Drop transient state while keeping the entity alive.
    fn cleaner(&self) {}

    /// Remove the entity from its host container.
    fn eraser(&self) {}

    /// Replace the wrapped state wholesale.
    fn updater(&self, _entity: &Variant, _new_value: &Variant) -> Result<(), VariantError> {
        Err(VariantError::NotAllowed("native update"))
    }

    /// Called when the first observer for `(event, sub)` is registered.
    fn on_observe(&self, _event: Atom, _sub: &str) {}

    /// Called when the last observer for `(event, sub)` is revoked.
    ///
    /// Fires exactly once per `(entity, event, sub)`; the observer layer
    /// guarantees the once-per-pair accounting.
    fn on_forget(&self, _event: Atom, _sub: &str) {}

    /// Called when the last handle to the wrapping variant is dropped.
    fn on_release(&self) {}
}

impl Variant {
    /// Resolve and invoke a getter property on a native or dynamic variant.
    pub fn invoke_getter(&self, name: &str, args: &[Variant]) -> Result<Variant, VariantError> {
        if let Some(ops) = self.as_native_ops() {
            return match ops.property_getter(name) {
                Some(method) => method(self, args),
                None => Err(VariantError::NotExists(name.to_owned())),
            };
        }
        if let Some(ops) = self.as_dynamic_ops() {
            // Dynamic variants take the property name as the first argument.
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(Variant::string(name));
            full.extend_from_slice(args);
            return (ops.getter)(&full);
        }
        Err(VariantError::invalid("native or dynamic", self.kind_name()))
    }

    /// Resolve and invoke a setter property on a native or dynamic variant.
    pub fn invoke_setter(&self, name: &str, args: &[Variant]) -> Result<Variant, VariantError> {
        if let Some(ops) = self.as_native_ops() {
            return match ops.property_setter(name) {
                Some(method) => method(self, args),
                None => Err(VariantError::NotExists(name.to_owned())),
            };
        }
        if let Some(ops) = self.as_dynamic_ops() {
            let setter = ops
                .setter
                .ok_or(VariantError::NotAllowed("dynamic variant has no setter"))?;
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(Variant::string(name));
            full.extend_from_slice(args);
            return setter(&full);
        }
        Err(VariantError::invalid("native or dynamic", self.kind_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Probe {
        released: Rc<Cell<bool>>,
    }

    impl NativeOps for Probe {
        fn property_getter(&self, name: &str) -> Option<NativeMethod> {
            match name {
                "answer" => Some(Rc::new(|_, _| Ok(Variant::longint(42)))),
                _ => None,
            }
        }

        fn on_release(&self) {
            self.released.set(true);
        }
    }

    #[test]
    fn getter_dispatch_and_release_hook() {
        let released = Rc::new(Cell::new(false));
        let native = Variant::native(Rc::new(Probe {
            released: released.clone(),
        }));

        let got = native.invoke_getter("answer", &[]).unwrap();
        assert_eq!(got.coerce_i64().unwrap(), 42);
        assert_eq!(
            native.invoke_getter("missing", &[]),
            Err(VariantError::NotExists("missing".into()))
        );

        drop(native);
        assert!(released.get());
    }
}
