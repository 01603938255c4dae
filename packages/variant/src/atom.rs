use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Mutex;

static INTERNED: Lazy<Mutex<FxHashSet<&'static str>>> =
    Lazy::new(|| Mutex::new(FxHashSet::default()));

/// An interned string with pointer-equality semantics.
///
/// Event names, exception names, and observer sub-types are compared many
/// times per scheduler tick, so they are interned once and compared as
/// pointers afterwards. Interned strings are leaked; the set of distinct
/// atoms in a run is small and bounded by the source documents.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom(&'static str);

impl Atom {
    /// Intern `s`, returning the canonical atom for it.
    pub fn intern(s: &str) -> Self {
        let mut set = INTERNED.lock().unwrap();
        match set.get(s) {
            Some(existing) => Atom(existing),
            None => {
                let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
                set.insert(leaked);
                Atom(leaked)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_canonical() {
        let a = Atom::intern("grow");
        let b = Atom::intern(&String::from("grow"));
        assert_eq!(a, b);
        assert!(std::ptr::eq(a.as_str(), b.as_str()));
    }
}
