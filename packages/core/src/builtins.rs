//! Built-in document variables, bound at stack init.
//!
//! Each is a native or plain variant stored in the coroutine's builtin
//! object; `$name` resolution falls back here after the scoped chain.

use crate::coroutine::CoroId;
use crate::edom::elements_variant;
use crate::timers::{make_timers_variant, TimerHub};
use hvml_dom::DomTree;
use hvml_variant::{NativeMethod, NativeOps, Variant, VariantError};
use regex::Regex;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

fn arg<'a>(args: &'a [Variant], index: usize, what: &'static str) -> Result<&'a Variant, VariantError> {
    args.get(index).ok_or(VariantError::BadArg(what))
}

fn method(f: impl Fn(&[Variant]) -> Result<Variant, VariantError> + 'static) -> NativeMethod {
    Rc::new(move |_, args| f(args))
}

// ---------------------------------------------------------------- $L

struct LogicalEntity;

impl NativeOps for LogicalEntity {
    fn name(&self) -> &'static str {
        "L"
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        fn numeric(
            cmp: fn(f64, f64) -> bool,
        ) -> NativeMethod {
            method(move |args| {
                let lhs = arg(args, 0, "lhs")?.coerce_number()?;
                let rhs = arg(args, 1, "rhs")?.coerce_number()?;
                Ok(Variant::boolean(cmp(lhs, rhs)))
            })
        }

        Some(match name {
            "lt" => numeric(|a, b| a < b),
            "gt" => numeric(|a, b| a > b),
            "le" => numeric(|a, b| a <= b),
            "ge" => numeric(|a, b| a >= b),
            "eq" => numeric(|a, b| a == b),
            "ne" => numeric(|a, b| a != b),
            "streq" => method(|args| {
                let mode = arg(args, 0, "mode")?.to_string();
                let (lhs, rhs) = match args.len() {
                    // streq('case', a, b) or streq(a, b)
                    3 => (arg(args, 1, "lhs")?.to_string(), arg(args, 2, "rhs")?.to_string()),
                    _ => (mode.clone(), arg(args, 1, "rhs")?.to_string()),
                };
                let equal = if args.len() == 3 && mode == "caseless" {
                    lhs.eq_ignore_ascii_case(&rhs)
                } else {
                    lhs == rhs
                };
                Ok(Variant::boolean(equal))
            }),
            "strne" => method(|args| {
                let lhs = arg(args, 0, "lhs")?.to_string();
                let rhs = arg(args, 1, "rhs")?.to_string();
                Ok(Variant::boolean(lhs != rhs))
            }),
            "contains" => method(|args| {
                let haystack = arg(args, 0, "haystack")?.to_string();
                let needle = arg(args, 1, "needle")?.to_string();
                Ok(Variant::boolean(haystack.contains(&needle)))
            }),
            "matches" => method(|args| {
                let text = arg(args, 0, "text")?.to_string();
                let pattern = arg(args, 1, "pattern")?.to_string();
                let regex =
                    Regex::new(&pattern).map_err(|_| VariantError::BadArg("bad pattern"))?;
                Ok(Variant::boolean(regex.is_match(&text)))
            }),
            "not" => method(|args| Ok(Variant::boolean(!arg(args, 0, "value")?.truthy()))),
            _ => return None,
        })
    }
}

// -------------------------------------------------------------- $STR

struct StringEntity;

impl NativeOps for StringEntity {
    fn name(&self) -> &'static str {
        "STR"
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        Some(match name {
            "join" => method(|args| {
                let mut out = String::new();
                for piece in args {
                    out.push_str(&piece.to_string());
                }
                Ok(Variant::string(out))
            }),
            "tolower" => method(|args| {
                Ok(Variant::string(arg(args, 0, "text")?.to_string().to_lowercase()))
            }),
            "toupper" => method(|args| {
                Ok(Variant::string(arg(args, 0, "text")?.to_string().to_uppercase()))
            }),
            "length" => method(|args| {
                Ok(Variant::ulongint(arg(args, 0, "text")?.to_string().chars().count() as u64))
            }),
            "substr" => method(|args| {
                let text = arg(args, 0, "text")?.to_string();
                let from = arg(args, 1, "from")?.coerce_i64()?.max(0) as usize;
                let len = args
                    .get(2)
                    .and_then(|v| v.coerce_i64().ok())
                    .map(|n| n.max(0) as usize);
                let tail: String = text.chars().skip(from).collect();
                let out = match len {
                    Some(len) => tail.chars().take(len).collect(),
                    None => tail,
                };
                Ok(Variant::string(out))
            }),
            "repeat" => method(|args| {
                let text = arg(args, 0, "text")?.to_string();
                let times = arg(args, 1, "times")?.coerce_i64()?.max(0) as usize;
                Ok(Variant::string(text.repeat(times)))
            }),
            _ => return None,
        })
    }
}

// ----------------------------------------------------------- $SYSTEM

struct SystemEntity;

impl NativeOps for SystemEntity {
    fn name(&self) -> &'static str {
        "SYSTEM"
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        Some(match name {
            "time" => method(|_| {
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                Ok(Variant::ulongint(secs))
            }),
            "random" => method(|args| {
                // subsecond clock noise is plenty for document-level use
                let max = args.get(0).and_then(|v| v.coerce_i64().ok()).unwrap_or(i64::MAX);
                let nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.subsec_nanos() as i64)
                    .unwrap_or(0);
                Ok(Variant::longint(if max > 0 { nanos % max } else { 0 }))
            }),
            "env" => method(|args| {
                let key = arg(args, 0, "name")?.to_string();
                Ok(match std::env::var(&key) {
                    Ok(value) => Variant::string(value),
                    Err(_) => Variant::undefined(),
                })
            }),
            "locale" => method(|_| {
                Ok(Variant::string(
                    std::env::var("LANG").unwrap_or_else(|_| String::from("C")),
                ))
            }),
            _ => return None,
        })
    }
}

// --------------------------------------------------------- $DATETIME

struct DateTimeEntity;

impl NativeOps for DateTimeEntity {
    fn name(&self) -> &'static str {
        "DATETIME"
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        Some(match name {
            "now" => method(|_| Ok(Variant::string(chrono::Local::now().to_rfc3339()))),
            "time_prt" => method(|args| {
                let format = args
                    .get(0)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| String::from("%Y-%m-%dT%H:%M:%S"));
                Ok(Variant::string(
                    chrono::Local::now().format(&format).to_string(),
                ))
            }),
            _ => return None,
        })
    }
}

// ----------------------------------------------------------- $EJSON

struct EjsonEntity;

impl NativeOps for EjsonEntity {
    fn name(&self) -> &'static str {
        "EJSON"
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        Some(match name {
            "type" => method(|args| Ok(Variant::string(arg(args, 0, "value")?.kind_name()))),
            "count" => method(|args| {
                let value = arg(args, 0, "value")?;
                let count = match value.kind_name() {
                    "array" | "tuple" => value.array_len(),
                    "object" => value.object_len(),
                    "set" => value.set_len(),
                    "undefined" | "null" => 0,
                    _ => 1,
                };
                Ok(Variant::ulongint(count as u64))
            }),
            "numberify" => method(|args| {
                Ok(Variant::number(arg(args, 0, "value")?.coerce_number().unwrap_or(0.0)))
            }),
            "stringify" => method(|args| Ok(Variant::string(arg(args, 0, "value")?.to_string()))),
            "serialize" => method(|args| Ok(Variant::string(arg(args, 0, "value")?.stringify()))),
            "parse" => method(|args| {
                let text = arg(args, 0, "text")?.to_string();
                let json: serde_json::Value = serde_json::from_str(&text)
                    .map_err(|_| VariantError::BadArg("malformed json"))?;
                Ok(Variant::from_json(&json))
            }),
            _ => return None,
        })
    }
}

// ------------------------------------------------------------- $DOC

struct DocEntity {
    edom: Rc<RefCell<DomTree>>,
}

impl NativeOps for DocEntity {
    fn name(&self) -> &'static str {
        "DOC"
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        let edom = self.edom.clone();
        Some(match name {
            "serialize" => Rc::new(move |_, _| {
                let tree = edom.borrow();
                Ok(Variant::string(tree.outer_html(tree.root())))
            }),
            "query" => Rc::new(move |_, args| {
                let selector = arg(args, 0, "selector")?.clone();
                let tree = edom.borrow();
                let ids = crate::edom::resolve_dom_target(&tree, &selector).unwrap_or_default();
                Ok(elements_variant(ids))
            }),
            _ => return None,
        })
    }
}

// ---------------------------------------------------------- $STREAM

struct StdoutEntity;

impl NativeOps for StdoutEntity {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        match name {
            "writelines" => Some(method(|args| {
                for line in args {
                    println!("{line}");
                }
                Ok(Variant::boolean(true))
            })),
            _ => None,
        }
    }
}

// ------------------------------------------------------------- $T

struct TextEntity {
    map: RefCell<rustc_hash::FxHashMap<String, String>>,
}

impl NativeOps for TextEntity {
    fn name(&self) -> &'static str {
        "T"
    }

    fn property_getter(&self, name: &str) -> Option<NativeMethod> {
        // `$T.anything` looks the key up; unmapped keys echo themselves
        let text = self.map.borrow().get(name).cloned();
        let fallback = name.to_owned();
        Some(Rc::new(move |_, _| {
            Ok(Variant::string(
                text.clone().unwrap_or_else(|| fallback.clone()),
            ))
        }))
    }
}

/// Build the full builtin object for one coroutine, wiring `$TIMERS` to
/// the timer hub and `$DOC` to the coroutine's output tree.
pub fn make_builtins(
    coro: CoroId,
    hub: Rc<RefCell<TimerHub>>,
    edom: Rc<RefCell<DomTree>>,
) -> (Variant, Variant) {
    let builtins = Variant::object();
    let timers = make_timers_variant(hub, coro);

    let hvml = Variant::object_with([
        ("base", Variant::string("")),
        ("max_iteration_count", Variant::ulongint(65_536)),
        ("timeout", Variant::number(10.0)),
    ]);

    let stream = Variant::object_with([("stdout", Variant::native(Rc::new(StdoutEntity)))]);

    let entries: [(&str, Variant); 11] = [
        ("HVML", hvml),
        ("SYSTEM", Variant::native(Rc::new(SystemEntity))),
        ("DATETIME", Variant::native(Rc::new(DateTimeEntity))),
        ("T", Variant::native(Rc::new(TextEntity { map: RefCell::new(Default::default()) }))),
        ("L", Variant::native(Rc::new(LogicalEntity))),
        ("STR", Variant::native(Rc::new(StringEntity))),
        ("STREAM", stream),
        ("DOC", Variant::native(Rc::new(DocEntity { edom }))),
        ("SESSION", Variant::object()),
        ("EJSON", Variant::native(Rc::new(EjsonEntity))),
        ("TIMERS", timers.clone()),
    ];
    for (name, value) in entries {
        builtins.object_set(name, value).unwrap();
    }

    (builtins, timers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtins() -> Variant {
        let hub = Rc::new(RefCell::new(TimerHub::default()));
        let edom = Rc::new(RefCell::new(DomTree::new_html()));
        make_builtins(CoroId(0), hub, edom).0
    }

    #[test]
    fn logical_comparisons() {
        let l = builtins().object_get("L").unwrap();
        let yes = l
            .invoke_getter("lt", &[Variant::longint(1), Variant::longint(2)])
            .unwrap();
        assert_eq!(yes.as_bool(), Some(true));

        let eq = l
            .invoke_getter("streq", &[Variant::string("a"), Variant::string("a")])
            .unwrap();
        assert_eq!(eq.as_bool(), Some(true));
    }

    #[test]
    fn ejson_parse_and_type() {
        let ejson = builtins().object_get("EJSON").unwrap();
        let parsed = ejson
            .invoke_getter("parse", &[Variant::string("{\"a\": [1, 2]}")])
            .unwrap();
        assert_eq!(parsed.kind_name(), "object");
        let ty = ejson.invoke_getter("type", &[parsed]).unwrap();
        assert_eq!(ty.to_string(), "object");
    }

    #[test]
    fn doc_serializes_the_live_tree() {
        let hub = Rc::new(RefCell::new(TimerHub::default()));
        let edom = Rc::new(RefCell::new(DomTree::new_html()));
        let (builtins, _) = make_builtins(CoroId(0), hub, edom.clone());

        let body = {
            let tree = edom.borrow();
            tree.find_by_tag(tree.root(), "body").unwrap()
        };
        edom.borrow_mut().append_content(body, "hi").unwrap();

        let doc = builtins.object_get("DOC").unwrap();
        let html = doc.invoke_getter("serialize", &[]).unwrap();
        assert_eq!(html.to_string(), "<html><head></head><body>hi</body></html>");
    }
}
