//! The value model shared by clients, the wire codec and the engine.
//!
//! Everything a command can carry as an argument, and everything a command
//! can produce, is a `Value`. Values are plain data: server-side objects are
//! `Instance`s (a qualified class name plus a field map) whose behaviour lives
//! in the engine's class registry, so copying a value never aliases state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::ResultId;

/// Namespace of the built-in value classes.
pub const BUILTINS: &str = "builtins";

/// Error text of the failure stored for a unit cancelled before it ran.
pub const ABORTED_BEFORE_EXECUTION: &str = "aborted before execution";

/// Runtime class names of the primitive variants.
pub mod class_names {
    pub const NONE: &str = "builtins.NoneType";
    pub const BOOL: &str = "builtins.bool";
    pub const INT: &str = "builtins.int";
    pub const FLOAT: &str = "builtins.float";
    pub const STR: &str = "builtins.str";
    pub const BYTES: &str = "builtins.bytes";
    pub const LIST: &str = "builtins.list";
    pub const DICT: &str = "builtins.dict";
    pub const SLICE: &str = "builtins.slice";
    pub const PROMISE: &str = "remora.Promise";
    pub const FAILURE: &str = "remora.ExecutionFailure";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Slice(Slice),
    Instance(Instance),
    /// Reference to a result that may not exist yet.
    Promise(ResultId),
    /// A stored failure. Failures are results, not transport errors.
    Failure(ExecutionFailure),
}

/// `start:stop:step` with every bound optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

/// An object of a registered class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Qualified class name, e.g. `shapes.Circle`.
    pub class: String,
    pub fields: BTreeMap<String, Value>,
}

/// Outcome of a command whose target operation raised.
///
/// Carries the failing command rendered as text and the original error. When
/// a failure flows into another command through a promise, the consuming
/// command's failure keeps the upstream chain in `context`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("execution of {command} failed with error: {error}")]
pub struct ExecutionFailure {
    pub command: String,
    pub error: String,
    #[serde(default)]
    pub context: Vec<String>,
}

impl ExecutionFailure {
    pub fn new(command: impl fmt::Display, error: impl fmt::Display) -> Self {
        Self {
            command: command.to_string(),
            error: error.to_string(),
            context: Vec::new(),
        }
    }

    /// Failure recorded for a unit that was cancelled before it ran.
    pub fn aborted(id: &ResultId) -> Self {
        Self::new(format!("command {}", id), ABORTED_BEFORE_EXECUTION)
    }

    /// Failure caused by consuming another failure.
    pub fn caused_by(command: impl fmt::Display, error: impl fmt::Display, upstream: &Self) -> Self {
        let mut context = vec![upstream.to_string()];
        context.extend(upstream.context.iter().cloned());
        Self {
            command: command.to_string(),
            error: error.to_string(),
            context,
        }
    }

    pub fn is_abort(&self) -> bool {
        self.error == ABORTED_BEFORE_EXECUTION
    }
}

impl Instance {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

impl Slice {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    /// Concrete indices selected from a sequence of `len` elements.
    ///
    /// Negative bounds count from the end and out-of-range bounds are
    /// clamped. A zero step is an error.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>, String> {
        let len = len as i64;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err("slice step cannot be zero".to_string());
        }

        let clamp = |bound: i64, lower: i64, upper: i64| {
            let bound = if bound < 0 { bound + len } else { bound };
            bound.clamp(lower, upper)
        };

        let mut out = Vec::new();
        if step > 0 {
            let start = self.start.map_or(0, |s| clamp(s, 0, len));
            let stop = self.stop.map_or(len, |s| clamp(s, 0, len));
            let mut i = start;
            while i < stop {
                out.push(i as usize);
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
        } else {
            let start = self.start.map_or(len - 1, |s| clamp(s, -1, len - 1));
            let stop = self.stop.map_or(-1, |s| clamp(s, -1, len - 1));
            let mut i = start;
            while i > stop {
                out.push(i as usize);
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
        }
        Ok(out)
    }
}

impl Value {
    /// Qualified name of the class that gives this value its behaviour.
    pub fn class_name(&self) -> &str {
        match self {
            Value::Null => class_names::NONE,
            Value::Bool(_) => class_names::BOOL,
            Value::Int(_) => class_names::INT,
            Value::Float(_) => class_names::FLOAT,
            Value::Str(_) => class_names::STR,
            Value::Bytes(_) => class_names::BYTES,
            Value::List(_) => class_names::LIST,
            Value::Map(_) => class_names::DICT,
            Value::Slice(_) => class_names::SLICE,
            Value::Instance(instance) => &instance.class,
            Value::Promise(_) => class_names::PROMISE,
            Value::Failure(_) => class_names::FAILURE,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_failure(&self) -> Option<&ExecutionFailure> {
        match self {
            Value::Failure(f) => Some(f),
            _ => None,
        }
    }

    /// Truthiness: empty containers, zero, null and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Slice(_) | Value::Instance(_) | Value::Promise(_) => true,
            Value::Failure(_) => false,
        }
    }

    /// Every promise id reachable from this value, at any depth.
    pub fn promises(&self) -> Vec<&ResultId> {
        let mut out = Vec::new();
        self.collect_promises(&mut out);
        out
    }

    fn collect_promises<'a>(&'a self, out: &mut Vec<&'a ResultId>) {
        match self {
            Value::Promise(id) => out.push(id),
            Value::List(items) => items.iter().for_each(|v| v.collect_promises(out)),
            Value::Map(map) => map.values().for_each(|v| v.collect_promises(out)),
            Value::Instance(instance) => instance
                .fields
                .values()
                .for_each(|v| v.collect_promises(out)),
            _ => {}
        }
    }

    /// Quoted rendering used inside containers and command descriptions.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            // Debug keeps the trailing ".0" on whole floats.
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "bytes[{}]", b.len()),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{:?}: {}", k, v.repr()))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Slice(s) => {
                let part = |b: Option<i64>| b.map(|v| v.to_string()).unwrap_or_default();
                write!(f, "{}:{}:{}", part(s.start), part(s.stop), part(s.step))
            }
            Value::Instance(instance) => write!(f, "<{} object>", instance.class),
            Value::Promise(id) => write!(f, "<promise {}>", id.short()),
            Value::Failure(failure) => write!(f, "{}", failure),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Slice> for Value {
    fn from(v: Slice) -> Self {
        Value::Slice(v)
    }
}

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Value::Instance(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_nested_containers() {
        let v = Value::from(vec![Value::from("a"), Value::Int(2), Value::Float(1.0)]);
        assert_eq!(v.to_string(), r#"["a", 2, 1.0]"#);
        assert_eq!(Value::from("plain").to_string(), "plain");
    }

    #[test]
    fn slice_indices_follow_sequence_semantics() {
        let all = Slice::default();
        assert_eq!(all.indices(3).unwrap(), vec![0, 1, 2]);

        let tail = Slice::new(Some(-2), None, None);
        assert_eq!(tail.indices(5).unwrap(), vec![3, 4]);

        let reversed = Slice::new(None, None, Some(-1));
        assert_eq!(reversed.indices(3).unwrap(), vec![2, 1, 0]);

        let stepped = Slice::new(Some(1), Some(100), Some(2));
        assert_eq!(stepped.indices(6).unwrap(), vec![1, 3, 5]);

        assert!(Slice::new(None, None, Some(0)).indices(3).is_err());
    }

    #[test]
    fn only_the_aborted_unit_itself_is_an_abort() {
        let id = ResultId::generate();
        let aborted = ExecutionFailure::aborted(&id);
        assert!(aborted.is_abort());
        assert_eq!(aborted.error, ABORTED_BEFORE_EXECUTION);

        let downstream = ExecutionFailure::caused_by("call x", "upstream failed", &aborted);
        assert!(!downstream.is_abort());
        assert!(!ExecutionFailure::new("call y", "boom").is_abort());
    }

    #[test]
    fn extreme_steps_stop_after_one_index() {
        let forward = Slice::new(Some(1), Some(10), Some(i64::MAX));
        assert_eq!(forward.indices(3).unwrap(), vec![1]);

        let backward = Slice::new(Some(-1), None, Some(i64::MIN));
        assert_eq!(backward.indices(3).unwrap(), vec![2]);

        let from_end = Slice::new(None, None, Some(i64::MIN + 1));
        assert_eq!(from_end.indices(4).unwrap(), vec![3]);
    }

    #[test]
    fn promises_are_collected_at_any_depth() {
        let a = ResultId::generate();
        let b = ResultId::generate();
        let v = Value::from(vec![
            Value::Promise(a.clone()),
            Value::from(vec![Value::Promise(b.clone())]),
        ]);
        assert_eq!(v.promises(), vec![&a, &b]);
    }

    #[test]
    fn failure_chain_keeps_upstream_message() {
        let upstream = ExecutionFailure::new("builtins.int(\"4a\")", "invalid literal");
        let chained = ExecutionFailure::caused_by("x.bit_length()", "upstream failed", &upstream);
        assert_eq!(chained.context.len(), 1);
        assert!(chained.context[0].contains("invalid literal"));
        assert_eq!(
            upstream.to_string(),
            "execution of builtins.int(\"4a\") failed with error: invalid literal"
        );
    }

    #[test]
    fn class_names_follow_variants() {
        assert_eq!(Value::from("x").class_name(), class_names::STR);
        assert_eq!(Value::Int(1).class_name(), class_names::INT);
        assert_eq!(Value::from(Instance::new("shapes.Circle")).class_name(), "shapes.Circle");
    }
}
