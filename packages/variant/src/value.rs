use crate::container::SetData;
use crate::listener::ListenerEntry;
use crate::native::NativeOps;
use crate::VariantError;
use indexmap::IndexMap;
use slab::Slab;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// The getter/setter pair backing a dynamic variant.
///
/// Both take the argument pack the caller supplied; the getter returns the
/// computed value, the setter returns whatever the property protocol wants
/// to hand back (usually `true`).
#[derive(Clone)]
pub struct DynamicOps {
    pub getter: Rc<dyn Fn(&[Variant]) -> Result<Variant, VariantError>>,
    pub setter: Option<Rc<dyn Fn(&[Variant]) -> Result<Variant, VariantError>>>,
}

/// The tagged payload of a [`Variant`].
pub enum VariantKind {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    LongInt(i64),
    ULongInt(u64),
    String(Rc<str>),
    ByteSeq(Rc<[u8]>),
    Array(RefCell<Vec<Variant>>),
    Object(RefCell<IndexMap<String, Variant>>),
    Set(RefCell<SetData>),
    Tuple(Box<[Variant]>),
    Dynamic(DynamicOps),
    Native(Rc<dyn NativeOps>),
}

pub(crate) struct VariantData {
    pub(crate) kind: VariantKind,
    pub(crate) listeners: RefCell<Slab<ListenerEntry>>,
    // Bumped on every structural change so listener snapshots can detect
    // re-entrant mutation.
    pub(crate) generation: Cell<u64>,
}

impl Drop for VariantData {
    fn drop(&mut self) {
        if let VariantKind::Native(ops) = &self.kind {
            ops.on_release();
        }
    }
}

/// A reference-counted tagged dynamic value.
///
/// `Variant` is a handle: cloning it is cheap and shares the payload, so
/// the C-style `ref`/`unref` pair becomes `Clone`/`Drop`. Two handles to
/// the same payload compare identical with [`Variant::ptr_eq`]; deep
/// comparison is [`Variant::eq_by_value`].
#[derive(Clone)]
pub struct Variant {
    pub(crate) inner: Rc<VariantData>,
}

impl Variant {
    fn from_kind(kind: VariantKind) -> Self {
        Variant {
            inner: Rc::new(VariantData {
                kind,
                listeners: RefCell::new(Slab::new()),
                generation: Cell::new(0),
            }),
        }
    }

    pub fn undefined() -> Self {
        Self::from_kind(VariantKind::Undefined)
    }

    pub fn null() -> Self {
        Self::from_kind(VariantKind::Null)
    }

    pub fn boolean(b: bool) -> Self {
        Self::from_kind(VariantKind::Boolean(b))
    }

    pub fn number(n: f64) -> Self {
        Self::from_kind(VariantKind::Number(n))
    }

    pub fn longint(n: i64) -> Self {
        Self::from_kind(VariantKind::LongInt(n))
    }

    pub fn ulongint(n: u64) -> Self {
        Self::from_kind(VariantKind::ULongInt(n))
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::from_kind(VariantKind::String(s.into()))
    }

    pub fn byte_seq(bytes: impl Into<Rc<[u8]>>) -> Self {
        Self::from_kind(VariantKind::ByteSeq(bytes.into()))
    }

    pub fn array(items: Vec<Variant>) -> Self {
        Self::from_kind(VariantKind::Array(RefCell::new(items)))
    }

    pub fn object() -> Self {
        Self::from_kind(VariantKind::Object(RefCell::new(IndexMap::new())))
    }

    /// Build an object from `(key, value)` pairs, preserving insertion order.
    pub fn object_with<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Variant)>) -> Self {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect::<IndexMap<_, _>>();
        Self::from_kind(VariantKind::Object(RefCell::new(map)))
    }

    /// Build a set whose elements are unique by the given key field.
    ///
    /// `key_field = None` makes elements unique by their whole stringified
    /// value.
    pub fn set_by_key(key_field: Option<&str>) -> Self {
        Self::from_kind(VariantKind::Set(RefCell::new(SetData::new(key_field))))
    }

    /// Fixed-arity immutable sequence.
    pub fn tuple(items: Vec<Variant>) -> Self {
        Self::from_kind(VariantKind::Tuple(items.into_boxed_slice()))
    }

    pub fn dynamic(ops: DynamicOps) -> Self {
        Self::from_kind(VariantKind::Dynamic(ops))
    }

    pub fn native(ops: Rc<dyn NativeOps>) -> Self {
        Self::from_kind(VariantKind::Native(ops))
    }

    pub fn kind(&self) -> &VariantKind {
        &self.inner.kind
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.inner.kind {
            VariantKind::Undefined => "undefined",
            VariantKind::Null => "null",
            VariantKind::Boolean(_) => "boolean",
            VariantKind::Number(_) => "number",
            VariantKind::LongInt(_) => "longint",
            VariantKind::ULongInt(_) => "ulongint",
            VariantKind::String(_) => "string",
            VariantKind::ByteSeq(_) => "bsequence",
            VariantKind::Array(_) => "array",
            VariantKind::Object(_) => "object",
            VariantKind::Set(_) => "set",
            VariantKind::Tuple(_) => "tuple",
            VariantKind::Dynamic(_) => "dynamic",
            VariantKind::Native(_) => "native",
        }
    }

    /// The number of live handles to this payload.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Identity comparison: do the two handles share a payload?
    pub fn ptr_eq(&self, other: &Variant) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self.inner.kind, VariantKind::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.inner.kind, VariantKind::Null)
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self.inner.kind,
            VariantKind::Array(_) | VariantKind::Object(_) | VariantKind::Set(_)
        )
    }

    pub fn is_native(&self) -> bool {
        matches!(self.inner.kind, VariantKind::Native(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.inner.kind, VariantKind::Dynamic(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.inner.kind {
            VariantKind::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.inner.kind {
            VariantKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_native_ops(&self) -> Option<Rc<dyn NativeOps>> {
        match &self.inner.kind {
            VariantKind::Native(ops) => Some(ops.clone()),
            _ => None,
        }
    }

    pub fn as_dynamic_ops(&self) -> Option<DynamicOps> {
        match &self.inner.kind {
            VariantKind::Dynamic(ops) => Some(ops.clone()),
            _ => None,
        }
    }

    /// Numeric coercion used by the arithmetic attribute operators and the
    /// executor formulas.
    pub fn coerce_number(&self) -> Result<f64, VariantError> {
        match &self.inner.kind {
            VariantKind::Number(n) => Ok(*n),
            VariantKind::LongInt(n) => Ok(*n as f64),
            VariantKind::ULongInt(n) => Ok(*n as f64),
            VariantKind::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            VariantKind::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| VariantError::invalid("number", "string")),
            VariantKind::Null => Ok(0.0),
            other => Err(VariantError::invalid("number", Variant::kind_name_of(other))),
        }
    }

    /// Integer coercion with the same rules as [`Variant::coerce_number`].
    pub fn coerce_i64(&self) -> Result<i64, VariantError> {
        match &self.inner.kind {
            VariantKind::LongInt(n) => Ok(*n),
            VariantKind::ULongInt(n) => Ok(*n as i64),
            _ => self.coerce_number().map(|n| n as i64),
        }
    }

    /// HVML truthiness: undefined, null, false, numeric zero, the empty
    /// string, and empty containers are false; everything else is true.
    pub fn truthy(&self) -> bool {
        match &self.inner.kind {
            VariantKind::Undefined | VariantKind::Null => false,
            VariantKind::Boolean(b) => *b,
            VariantKind::Number(n) => *n != 0.0,
            VariantKind::LongInt(n) => *n != 0,
            VariantKind::ULongInt(n) => *n != 0,
            VariantKind::String(s) => !s.is_empty(),
            VariantKind::ByteSeq(b) => !b.is_empty(),
            VariantKind::Array(a) => !a.borrow().is_empty(),
            VariantKind::Object(o) => !o.borrow().is_empty(),
            VariantKind::Set(s) => !s.borrow().is_empty(),
            VariantKind::Tuple(t) => !t.is_empty(),
            VariantKind::Dynamic(_) | VariantKind::Native(_) => true,
        }
    }

    /// Deep structural equality. Reference kinds (dynamic, native) compare
    /// by identity.
    pub fn eq_by_value(&self, other: &Variant) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (&self.inner.kind, &other.inner.kind) {
            (VariantKind::Undefined, VariantKind::Undefined) => true,
            (VariantKind::Null, VariantKind::Null) => true,
            (VariantKind::Boolean(a), VariantKind::Boolean(b)) => a == b,
            (VariantKind::Number(a), VariantKind::Number(b)) => a == b,
            (VariantKind::LongInt(a), VariantKind::LongInt(b)) => a == b,
            (VariantKind::ULongInt(a), VariantKind::ULongInt(b)) => a == b,
            (VariantKind::Number(a), VariantKind::LongInt(b)) => *b as f64 == *a,
            (VariantKind::Number(a), VariantKind::ULongInt(b)) => *b as f64 == *a,
            (VariantKind::LongInt(a), VariantKind::Number(b)) => *a as f64 == *b,
            (VariantKind::ULongInt(a), VariantKind::Number(b)) => *a as f64 == *b,
            (VariantKind::LongInt(a), VariantKind::ULongInt(b)) => {
                u64::try_from(*a).map(|a| a == *b).unwrap_or(false)
            }
            (VariantKind::ULongInt(a), VariantKind::LongInt(b)) => {
                u64::try_from(*b).map(|b| b == *a).unwrap_or(false)
            }
            (VariantKind::String(a), VariantKind::String(b)) => a == b,
            (VariantKind::ByteSeq(a), VariantKind::ByteSeq(b)) => a == b,
            (VariantKind::Array(a), VariantKind::Array(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eq_by_value(y))
            }
            (VariantKind::Tuple(a), VariantKind::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eq_by_value(y))
            }
            (VariantKind::Object(a), VariantKind::Object(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.eq_by_value(w)).unwrap_or(false))
            }
            (VariantKind::Set(a), VariantKind::Set(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.eq_by_value(y))
            }
            _ => false,
        }
    }

    fn kind_name_of(kind: &VariantKind) -> &'static str {
        // A detached copy of kind_name for error paths that only have the kind.
        match kind {
            VariantKind::Undefined => "undefined",
            VariantKind::Null => "null",
            VariantKind::Boolean(_) => "boolean",
            VariantKind::Number(_) => "number",
            VariantKind::LongInt(_) => "longint",
            VariantKind::ULongInt(_) => "ulongint",
            VariantKind::String(_) => "string",
            VariantKind::ByteSeq(_) => "bsequence",
            VariantKind::Array(_) => "array",
            VariantKind::Object(_) => "object",
            VariantKind::Set(_) => "set",
            VariantKind::Tuple(_) => "tuple",
            VariantKind::Dynamic(_) => "dynamic",
            VariantKind::Native(_) => "native",
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variant({}: {})", self.kind_name(), self)
    }
}

impl fmt::Display for Variant {
    /// Text rendering as used by content interpolation: strings render
    /// bare, everything else renders as its JSON form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            VariantKind::Undefined => f.write_str("undefined"),
            VariantKind::Null => f.write_str("null"),
            VariantKind::Boolean(b) => write!(f, "{b}"),
            VariantKind::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            VariantKind::LongInt(n) => write!(f, "{n}"),
            VariantKind::ULongInt(n) => write!(f, "{n}"),
            VariantKind::String(s) => f.write_str(s),
            _ => f.write_str(&self.stringify()),
        }
    }
}

impl From<bool> for Variant {
    fn from(b: bool) -> Self {
        Variant::boolean(b)
    }
}

impl From<f64> for Variant {
    fn from(n: f64) -> Self {
        Variant::number(n)
    }
}

impl From<i64> for Variant {
    fn from(n: i64) -> Self {
        Variant::longint(n)
    }
}

impl From<u64> for Variant {
    fn from(n: u64) -> Self {
        Variant::ulongint(n)
    }
}

impl From<&str> for Variant {
    fn from(s: &str) -> Self {
        Variant::string(s)
    }
}

impl From<String> for Variant {
    fn from(s: String) -> Self {
        Variant::string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_payload() {
        let a = Variant::array(vec![Variant::longint(1)]);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.ref_count(), 2);
        drop(b);
        assert_eq!(a.ref_count(), 1);
    }

    #[test]
    fn truthiness_rules() {
        assert!(!Variant::undefined().truthy());
        assert!(!Variant::null().truthy());
        assert!(!Variant::string("").truthy());
        assert!(!Variant::array(vec![]).truthy());
        assert!(Variant::number(0.5).truthy());
        assert!(Variant::string("x").truthy());
    }

    #[test]
    fn deep_equality_crosses_numeric_kinds() {
        assert!(Variant::longint(3).eq_by_value(&Variant::ulongint(3)));
        assert!(Variant::number(3.0).eq_by_value(&Variant::longint(3)));
        assert!(!Variant::longint(-1).eq_by_value(&Variant::ulongint(u64::MAX)));
    }
}
