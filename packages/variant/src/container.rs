//! Container operations: object, array, set, tuple.
//!
//! Every mutator resolves the target slot first, applies the structural
//! change, then fires the matching post-listeners before returning. The
//! argument pack is always `[key-new, value-new, key-old, value-old]`.

use crate::{change_atom, grow_atom, shrink_atom, Variant, VariantError, VariantKind};
use indexmap::IndexMap;

/// Backing storage for the set kind: elements unique by a chosen key
/// field, held in insertion order.
pub struct SetData {
    key_field: Option<String>,
    entries: IndexMap<String, Variant>,
}

impl SetData {
    pub(crate) fn new(key_field: Option<&str>) -> Self {
        SetData {
            key_field: key_field.map(str::to_owned),
            entries: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variant> {
        self.entries.values()
    }

    /// The uniqueness key of `value` under this set's key field.
    fn unique_key(&self, value: &Variant) -> String {
        match &self.key_field {
            Some(field) => match value.object_get(field) {
                Some(member) => member.stringify(),
                None => String::new(),
            },
            None => value.stringify(),
        }
    }
}

impl Variant {
    // ---------------------------------------------------------- objects

    /// Insert or displace `key`. Displacing fires `change`, inserting
    /// fires `grow`.
    pub fn object_set(&self, key: impl Into<String>, value: Variant) -> Result<(), VariantError> {
        let key = key.into();
        let old = match &self.inner.kind {
            VariantKind::Object(map) => map.borrow_mut().insert(key.clone(), value.clone()),
            _ => return Err(VariantError::invalid("object", self.kind_name())),
        };

        let key_v = Variant::string(key);
        match old {
            Some(old) => self.fire_post(
                change_atom(),
                &[key_v.clone(), value, key_v, old],
            ),
            None => self.fire_post(
                grow_atom(),
                &[key_v, value, Variant::undefined(), Variant::undefined()],
            ),
        }
        Ok(())
    }

    /// Fetch a member. `None` when the key is absent or the kind is not an
    /// object; use [`Variant::object_get_checked`] when absence is an error.
    pub fn object_get(&self, key: &str) -> Option<Variant> {
        match &self.inner.kind {
            VariantKind::Object(map) => map.borrow().get(key).cloned(),
            _ => None,
        }
    }

    /// Non-silent fetch: a missing key is `NotExists`.
    pub fn object_get_checked(&self, key: &str) -> Result<Variant, VariantError> {
        match &self.inner.kind {
            VariantKind::Object(map) => map
                .borrow()
                .get(key)
                .cloned()
                .ok_or_else(|| VariantError::NotExists(key.to_owned())),
            _ => Err(VariantError::invalid("object", self.kind_name())),
        }
    }

    pub fn object_remove(&self, key: &str) -> Result<Option<Variant>, VariantError> {
        let old = match &self.inner.kind {
            // shift_remove keeps the remaining members in insertion order
            VariantKind::Object(map) => map.borrow_mut().shift_remove(key),
            _ => return Err(VariantError::invalid("object", self.kind_name())),
        };

        if let Some(old) = &old {
            self.fire_post(
                shrink_atom(),
                &[
                    Variant::undefined(),
                    Variant::undefined(),
                    Variant::string(key),
                    old.clone(),
                ],
            );
        }
        Ok(old)
    }

    pub fn object_len(&self) -> usize {
        match &self.inner.kind {
            VariantKind::Object(map) => map.borrow().len(),
            _ => 0,
        }
    }

    pub fn object_keys(&self) -> Vec<String> {
        match &self.inner.kind {
            VariantKind::Object(map) => map.borrow().keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    // ----------------------------------------------------------- arrays

    pub fn array_push(&self, value: Variant) {
        let index = match &self.inner.kind {
            VariantKind::Array(items) => {
                let mut items = items.borrow_mut();
                items.push(value.clone());
                items.len() - 1
            }
            _ => {
                log::warn!("array_push on {} variant ignored", self.kind_name());
                return;
            }
        };
        self.fire_post(
            grow_atom(),
            &[
                Variant::ulongint(index as u64),
                value,
                Variant::undefined(),
                Variant::undefined(),
            ],
        );
    }

    pub fn array_insert(&self, index: usize, value: Variant) -> Result<(), VariantError> {
        match &self.inner.kind {
            VariantKind::Array(items) => {
                let mut items = items.borrow_mut();
                if index > items.len() {
                    return Err(VariantError::BadArg("array index out of bounds"));
                }
                items.insert(index, value.clone());
            }
            _ => return Err(VariantError::invalid("array", self.kind_name())),
        }
        self.fire_post(
            grow_atom(),
            &[
                Variant::ulongint(index as u64),
                value,
                Variant::undefined(),
                Variant::undefined(),
            ],
        );
        Ok(())
    }

    pub fn array_remove(&self, index: usize) -> Result<Variant, VariantError> {
        let old = match &self.inner.kind {
            VariantKind::Array(items) => {
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    return Err(VariantError::BadArg("array index out of bounds"));
                }
                items.remove(index)
            }
            _ => return Err(VariantError::invalid("array", self.kind_name())),
        };
        self.fire_post(
            shrink_atom(),
            &[
                Variant::undefined(),
                Variant::undefined(),
                Variant::ulongint(index as u64),
                old.clone(),
            ],
        );
        Ok(old)
    }

    /// Snapshot-by-index access: safe to call while a listener fired by a
    /// mutation of the same array is still on the stack.
    pub fn array_get(&self, index: usize) -> Option<Variant> {
        match &self.inner.kind {
            VariantKind::Array(items) => items.borrow().get(index).cloned(),
            VariantKind::Tuple(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    pub fn array_len(&self) -> usize {
        match &self.inner.kind {
            VariantKind::Array(items) => items.borrow().len(),
            VariantKind::Tuple(items) => items.len(),
            _ => 0,
        }
    }

    // ------------------------------------------------------------- sets

    /// Insert `value` into a set. An element with the same uniqueness key
    /// is displaced (fires `change`); a fresh element fires `grow`.
    pub fn set_add(&self, value: Variant) -> Result<(), VariantError> {
        let (key, old) = match &self.inner.kind {
            VariantKind::Set(data) => {
                let mut data = data.borrow_mut();
                let key = data.unique_key(&value);
                let old = data.entries.insert(key.clone(), value.clone());
                (key, old)
            }
            _ => return Err(VariantError::invalid("set", self.kind_name())),
        };

        let key_v = Variant::string(key);
        match old {
            Some(old) => self.fire_post(change_atom(), &[key_v.clone(), value, key_v, old]),
            None => self.fire_post(
                grow_atom(),
                &[key_v, value, Variant::undefined(), Variant::undefined()],
            ),
        }
        Ok(())
    }

    pub fn set_remove_by_key(&self, key: &str) -> Result<Option<Variant>, VariantError> {
        let old = match &self.inner.kind {
            VariantKind::Set(data) => data.borrow_mut().entries.shift_remove(key),
            _ => return Err(VariantError::invalid("set", self.kind_name())),
        };
        if let Some(old) = &old {
            self.fire_post(
                shrink_atom(),
                &[
                    Variant::undefined(),
                    Variant::undefined(),
                    Variant::string(key),
                    old.clone(),
                ],
            );
        }
        Ok(old)
    }

    pub fn set_get_by_key(&self, key: &str) -> Option<Variant> {
        match &self.inner.kind {
            VariantKind::Set(data) => data.borrow().entries.get(key).cloned(),
            _ => None,
        }
    }

    pub fn set_len(&self) -> usize {
        match &self.inner.kind {
            VariantKind::Set(data) => data.borrow().len(),
            _ => 0,
        }
    }

    /// Snapshot of the set's members in insertion order.
    pub fn set_members(&self) -> Vec<Variant> {
        match &self.inner.kind {
            VariantKind::Set(data) => data.borrow().iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------ shared

    /// Generic member iteration used by `iterate`/`reduce`: arrays and
    /// tuples yield elements, objects yield values, sets yield members,
    /// scalars yield themselves once.
    pub fn members(&self) -> Vec<Variant> {
        match &self.inner.kind {
            VariantKind::Array(items) => items.borrow().clone(),
            VariantKind::Tuple(items) => items.to_vec(),
            VariantKind::Object(map) => map.borrow().values().cloned().collect(),
            VariantKind::Set(data) => data.borrow().iter().cloned().collect(),
            _ => vec![self.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn object_set_then_get_is_identity() {
        let obj = Variant::object();
        let v = Variant::array(vec![Variant::longint(7)]);
        obj.object_set("k", v.clone()).unwrap();
        assert!(obj.object_get("k").unwrap().ptr_eq(&v));
    }

    #[test]
    fn missing_key_is_not_exists_when_checked() {
        let obj = Variant::object();
        assert_eq!(
            obj.object_get_checked("nope"),
            Err(VariantError::NotExists("nope".into()))
        );
        assert!(obj.object_get("nope").is_none());
    }

    #[test]
    fn grow_and_shrink_carry_the_four_slot_pack() {
        let obj = Variant::object();
        let seen: Rc<RefCell<Vec<(String, Vec<String>)>>> = Rc::new(RefCell::new(Vec::new()));

        for event in [grow_atom(), shrink_atom()] {
            let seen2 = seen.clone();
            obj.register_post_listener(
                event,
                Rc::new(move |_, ev, args| {
                    seen2.borrow_mut().push((
                        ev.as_str().to_owned(),
                        args.iter().map(|a| a.to_string()).collect(),
                    ));
                }),
            );
        }

        obj.object_set("k", Variant::longint(1)).unwrap();
        obj.object_remove("k").unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "grow");
        assert_eq!(seen[0].1, vec!["k", "1", "undefined", "undefined"]);
        assert_eq!(seen[1].0, "shrink");
        assert_eq!(seen[1].1, vec!["undefined", "undefined", "k", "1"]);
    }

    #[test]
    fn set_displaces_by_key_field() {
        let set = Variant::set_by_key(Some("id"));
        set.set_add(Variant::object_with([
            ("id", Variant::string("t")),
            ("interval", Variant::longint(10)),
        ]))
        .unwrap();
        set.set_add(Variant::object_with([
            ("id", Variant::string("t")),
            ("interval", Variant::longint(99)),
        ]))
        .unwrap();

        assert_eq!(set.set_len(), 1);
        let member = set.set_get_by_key("t").unwrap();
        assert_eq!(member.object_get("interval").unwrap().coerce_i64().unwrap(), 99);
    }

    #[test]
    fn listener_sees_post_mutation_container() {
        let arr = Variant::array(vec![]);
        let arr2 = arr.clone();
        let len_at_fire = Rc::new(std::cell::Cell::new(0usize));
        let len2 = len_at_fire.clone();
        arr.register_post_listener(
            grow_atom(),
            Rc::new(move |_, _, _| len2.set(arr2.array_len())),
        );
        arr.array_push(Variant::null());
        assert_eq!(len_at_fire.get(), 1);
    }
}
