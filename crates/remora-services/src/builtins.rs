//! The `builtins` module: constructors and common methods for primitive
//! values (`str`, `int`, `float`, `bool`, `list`, `dict`).

use std::collections::BTreeMap;

use remora_core::value::{class_names, BUILTINS};
use remora_core::Value;

use crate::registry::{Args, ClassDef, ExecError, Registry};

pub fn register(registry: &mut Registry) {
    registry
        .register(BUILTINS, str_class())
        .register(BUILTINS, int_class())
        .register(BUILTINS, float_class())
        .register(BUILTINS, bool_class())
        .register(BUILTINS, list_class())
        .register(BUILTINS, dict_class());
}

fn to_str(this: &Value, _: Args) -> Result<Value, ExecError> {
    Ok(Value::Str(this.to_string()))
}

fn this_str(this: &Value) -> Result<&str, ExecError> {
    this.as_str()
        .ok_or_else(|| ExecError::Type(format!("expected str, got {}", this.class_name())))
}

fn this_list(this: &Value) -> Result<&[Value], ExecError> {
    this.as_list()
        .ok_or_else(|| ExecError::Type(format!("expected list, got {}", this.class_name())))
}

fn this_map(this: &Value) -> Result<&BTreeMap<String, Value>, ExecError> {
    match this {
        Value::Map(map) => Ok(map),
        other => Err(ExecError::Type(format!(
            "expected dict, got {}",
            other.class_name()
        ))),
    }
}

/// Normalize a possibly negative index against `len`.
fn index(i: i64, len: usize) -> Result<usize, ExecError> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx < 0 || idx >= len as i64 {
        return Err(ExecError::Index(format!("index {} out of range", i)));
    }
    Ok(idx as usize)
}

/// `__getitem__` over a sequence of `len` items: an int picks one item, a
/// slice picks several.
fn select<T: Clone>(
    items: &[T],
    key: &Value,
    one: impl Fn(T) -> Value,
    many: impl Fn(Vec<T>) -> Value,
) -> Result<Value, ExecError> {
    match key {
        Value::Int(i) => Ok(one(items[index(*i, items.len())?].clone())),
        Value::Slice(slice) => {
            let picked = slice
                .indices(items.len())
                .map_err(ExecError::Value)?
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(many(picked))
        }
        other => Err(ExecError::Type(format!(
            "indices must be integers or slices, not {}",
            other.class_name()
        ))),
    }
}

fn str_class() -> ClassDef {
    ClassDef::new("str")
        .constructor(|args| {
            args.at_most(1, "str")?;
            Ok(Value::Str(
                args.get(0, "object").map(Value::to_string).unwrap_or_default(),
            ))
        })
        .method("__str__", to_str)
        .method("__len__", |this, _| Ok(Value::from(this_str(this)?.chars().count())))
        .method_returning("__getitem__", class_names::STR, |this, args| {
            let chars: Vec<char> = this_str(this)?.chars().collect();
            select(
                &chars,
                args.required(0, "key")?,
                |c| Value::Str(c.to_string()),
                |cs| Value::Str(cs.into_iter().collect()),
            )
        })
        .method_returning("upper", class_names::STR, |this, _| {
            Ok(Value::Str(this_str(this)?.to_uppercase()))
        })
        .method_returning("lower", class_names::STR, |this, _| {
            Ok(Value::Str(this_str(this)?.to_lowercase()))
        })
        .method_returning("strip", class_names::STR, |this, _| {
            Ok(Value::Str(this_str(this)?.trim().to_string()))
        })
        .method_returning("split", class_names::LIST, |this, args| {
            let s = this_str(this)?;
            let parts: Vec<Value> = match args.get(0, "sep") {
                None | Some(Value::Null) => s.split_whitespace().map(Value::from).collect(),
                Some(Value::Str(sep)) if sep.is_empty() => {
                    return Err(ExecError::Value("empty separator".into()))
                }
                Some(Value::Str(sep)) => s.split(sep.as_str()).map(Value::from).collect(),
                Some(other) => {
                    return Err(ExecError::Type(format!(
                        "must be str or None, not {}",
                        other.class_name()
                    )))
                }
            };
            Ok(Value::List(parts))
        })
        .method_returning("join", class_names::STR, |this, args| {
            let sep = this_str(this)?;
            let items = args.required(0, "iterable")?;
            let parts = items
                .as_list()
                .ok_or_else(|| ExecError::Type("can only join a list".into()))?
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_string).ok_or_else(|| {
                        ExecError::Type(format!("expected str instance, {} found", v.class_name()))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Str(parts.join(sep)))
        })
        .method_returning("replace", class_names::STR, |this, args| {
            let s = this_str(this)?;
            Ok(Value::Str(s.replace(args.str(0, "old")?, args.str(1, "new")?)))
        })
        .method_returning("startswith", class_names::BOOL, |this, args| {
            Ok(Value::Bool(this_str(this)?.starts_with(args.str(0, "prefix")?)))
        })
        .method_returning("endswith", class_names::BOOL, |this, args| {
            Ok(Value::Bool(this_str(this)?.ends_with(args.str(0, "suffix")?)))
        })
        .method_returning("find", class_names::INT, |this, args| {
            let s = this_str(this)?;
            let found = s
                .find(args.str(0, "sub")?)
                .map(|byte| s[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::Int(found))
        })
        .method_returning("count", class_names::INT, |this, args| {
            let sub = args.str(0, "sub")?;
            let s = this_str(this)?;
            let n = if sub.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(sub).count()
            };
            Ok(Value::from(n))
        })
}

fn parse_int(raw: &str) -> Result<i64, ExecError> {
    raw.trim()
        .replace('_', "")
        .parse()
        .map_err(|_| ExecError::Value(format!("invalid literal for int() with base 10: {:?}", raw)))
}

fn int_class() -> ClassDef {
    ClassDef::new("int")
        .constructor(|args| {
            args.at_most(1, "int")?;
            let n = match args.get(0, "x") {
                None => 0,
                Some(Value::Int(i)) => *i,
                Some(Value::Bool(b)) => *b as i64,
                Some(Value::Float(f)) if f.is_finite() => f.trunc() as i64,
                Some(Value::Float(f)) => {
                    return Err(ExecError::Value(format!("cannot convert float {} to integer", f)))
                }
                Some(Value::Str(s)) => parse_int(s)?,
                Some(other) => {
                    return Err(ExecError::Type(format!(
                        "int() argument must be a string or a number, not {}",
                        other.class_name()
                    )))
                }
            };
            Ok(Value::Int(n))
        })
        .method("__str__", to_str)
        .method_returning("bit_length", class_names::INT, |this, _| {
            let n = this.as_int().unwrap_or(0);
            Ok(Value::Int(64 - n.unsigned_abs().leading_zeros() as i64))
        })
        .attribute("real", |this| Ok(this.clone()))
        .attribute("imag", |_| Ok(Value::Int(0)))
}

fn float_class() -> ClassDef {
    ClassDef::new("float")
        .constructor(|args| {
            args.at_most(1, "float")?;
            let f = match args.get(0, "x") {
                None => 0.0,
                Some(Value::Float(f)) => *f,
                Some(Value::Int(i)) => *i as f64,
                Some(Value::Bool(b)) => *b as i64 as f64,
                Some(Value::Str(s)) => s.trim().parse().map_err(|_| {
                    ExecError::Value(format!("could not convert string to float: {:?}", s))
                })?,
                Some(other) => {
                    return Err(ExecError::Type(format!(
                        "float() argument must be a string or a number, not {}",
                        other.class_name()
                    )))
                }
            };
            Ok(Value::Float(f))
        })
        .method("__str__", to_str)
        .method_returning("is_integer", class_names::BOOL, |this, _| match this {
            Value::Float(f) => Ok(Value::Bool(f.is_finite() && f.fract() == 0.0)),
            other => Err(ExecError::Type(format!("expected float, got {}", other.class_name()))),
        })
        .attribute("real", |this| Ok(this.clone()))
        .attribute("imag", |_| Ok(Value::Float(0.0)))
}

fn bool_class() -> ClassDef {
    ClassDef::new("bool")
        .constructor(|args| {
            args.at_most(1, "bool")?;
            Ok(Value::Bool(
                args.get(0, "x").map(Value::is_truthy).unwrap_or(false),
            ))
        })
        .method("__str__", to_str)
}

fn list_class() -> ClassDef {
    ClassDef::new("list")
        .constructor(|args| {
            args.at_most(1, "list")?;
            let items = match args.get(0, "iterable") {
                None => Vec::new(),
                Some(Value::List(items)) => items.clone(),
                Some(Value::Str(s)) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                Some(Value::Map(map)) => map.keys().cloned().map(Value::Str).collect(),
                Some(other) => {
                    return Err(ExecError::Type(format!(
                        "'{}' object is not iterable",
                        other.class_name()
                    )))
                }
            };
            Ok(Value::List(items))
        })
        .method("__str__", to_str)
        .method("__len__", |this, _| Ok(Value::from(this_list(this)?.len())))
        .method("__getitem__", |this, args| {
            select(this_list(this)?, args.required(0, "key")?, |v| v, Value::List)
        })
        .method_returning("count", class_names::INT, |this, args| {
            let needle = args.required(0, "value")?;
            Ok(Value::from(
                this_list(this)?.iter().filter(|v| *v == needle).count(),
            ))
        })
        .method_returning("index", class_names::INT, |this, args| {
            let needle = args.required(0, "value")?;
            this_list(this)?
                .iter()
                .position(|v| v == needle)
                .map(Value::from)
                .ok_or_else(|| ExecError::Value(format!("{} is not in list", needle.repr())))
        })
        .method_returning("copy", class_names::LIST, |this, _| {
            Ok(Value::List(this_list(this)?.to_vec()))
        })
}

fn dict_class() -> ClassDef {
    ClassDef::new("dict")
        .constructor(|args| {
            args.at_most(1, "dict")?;
            let mut map = match args.positional.first() {
                None => BTreeMap::new(),
                Some(Value::Map(map)) => map.clone(),
                Some(other) => {
                    return Err(ExecError::Type(format!(
                        "'{}' object is not a mapping",
                        other.class_name()
                    )))
                }
            };
            map.extend(args.keyword);
            Ok(Value::Map(map))
        })
        .method("__str__", to_str)
        .method("__len__", |this, _| Ok(Value::from(this_map(this)?.len())))
        .method("__getitem__", |this, args| {
            let key = args.str(0, "key")?;
            this_map(this)?
                .get(key)
                .cloned()
                .ok_or_else(|| ExecError::Key(format!("{:?}", key)))
        })
        .method("get", |this, args| {
            let key = args.str(0, "key")?;
            let default = args.get(1, "default").cloned().unwrap_or(Value::Null);
            Ok(this_map(this)?.get(key).cloned().unwrap_or(default))
        })
        .method_returning("keys", class_names::LIST, |this, _| {
            Ok(Value::List(
                this_map(this)?.keys().cloned().map(Value::Str).collect(),
            ))
        })
        .method_returning("values", class_names::LIST, |this, _| {
            Ok(Value::List(this_map(this)?.values().cloned().collect()))
        })
        .method_returning("items", class_names::LIST, |this, _| {
            Ok(Value::List(
                this_map(this)?
                    .iter()
                    .map(|(k, v)| Value::List(vec![Value::Str(k.clone()), v.clone()]))
                    .collect(),
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use remora_core::command::Kwargs;
    use remora_core::Slice;

    fn args(positional: Vec<Value>) -> Args {
        Args::new(positional, Kwargs::new())
    }

    #[test]
    fn str_constructor_and_methods() {
        let registry = Registry::with_builtins();
        let s = registry
            .create(BUILTINS, "str", args(vec![Value::from("456")]))
            .unwrap();
        assert_eq!(s, Value::from("456"));
        assert_eq!(registry.call(&s, "__len__", args(vec![])).unwrap(), Value::Int(3));
        assert_eq!(
            registry.call(&s, "__getitem__", args(vec![Value::Int(-1)])).unwrap(),
            Value::from("6")
        );
        let sliced = Value::Slice(Slice::new(Some(1), None, None));
        assert_eq!(
            registry.call(&s, "__getitem__", args(vec![sliced])).unwrap(),
            Value::from("56")
        );
        let huge_step = Value::Slice(Slice::new(Some(1), Some(10), Some(i64::MAX)));
        assert_eq!(
            registry.call(&s, "__getitem__", args(vec![huge_step])).unwrap(),
            Value::from("5")
        );
        let parts = registry
            .call(&Value::from("a,b"), "split", args(vec![Value::from(",")]))
            .unwrap();
        assert_eq!(parts, Value::from(vec!["a", "b"]));
    }

    #[test]
    fn int_of_invalid_literal_is_a_value_error() {
        let registry = Registry::with_builtins();
        let err = registry
            .create(BUILTINS, "int", args(vec![Value::from("4a")]))
            .unwrap_err();
        assert!(matches!(err, ExecError::Value(_)));
        assert!(err.to_string().contains("invalid literal"));

        let n = registry
            .create(BUILTINS, "int", args(vec![Value::from(" 42 ")]))
            .unwrap();
        assert_eq!(n, Value::Int(42));
        assert_eq!(registry.get_attr(&n, "real").unwrap(), Value::Int(42));
        assert_eq!(
            registry.call(&n, "bit_length", args(vec![])).unwrap(),
            Value::Int(6)
        );
    }

    #[test]
    fn containers_index_and_measure() {
        let registry = Registry::with_builtins();
        let list = registry
            .create(BUILTINS, "list", args(vec![Value::from("abc")]))
            .unwrap();
        assert_eq!(list, Value::from(vec!["a", "b", "c"]));
        assert!(matches!(
            registry.call(&list, "__getitem__", args(vec![Value::Int(3)])),
            Err(ExecError::Index(_))
        ));

        let mut kwargs = Kwargs::new();
        kwargs.insert("x".into(), Value::Int(1));
        let dict = registry
            .create(BUILTINS, "dict", Args::new(vec![], kwargs))
            .unwrap();
        assert_eq!(registry.call(&dict, "__len__", args(vec![])).unwrap(), Value::Int(1));
        assert_eq!(
            registry.call(&dict, "__getitem__", args(vec![Value::from("x")])).unwrap(),
            Value::Int(1)
        );
        assert!(matches!(
            registry.call(&dict, "__getitem__", args(vec![Value::from("y")])),
            Err(ExecError::Key(_))
        ));
    }

    #[test]
    fn conversions_between_primitives() {
        let registry = Registry::with_builtins();
        assert_eq!(
            registry.create(BUILTINS, "float", args(vec![Value::from("2.5")])).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            registry.create(BUILTINS, "bool", args(vec![Value::from("")])).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            registry.create(BUILTINS, "str", args(vec![Value::Int(7)])).unwrap(),
            Value::from("7")
        );
    }
}
