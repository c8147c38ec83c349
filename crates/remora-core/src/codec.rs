//! Wire codec for commands and values.
//!
//! Commands travel as JSON objects with a single top-level key naming the
//! kind: `{"create": {"module": "builtins", "class": "str", "args": ["456"]}}`.
//! Plain JSON maps onto `Value` directly. Values JSON cannot express are
//! wrapped in a `__jsonclass__` tag:
//!
//! - `{"__jsonclass__": ["Promise", "<result id>"]}`
//! - `{"__jsonclass__": ["slice", [start, stop, step]]}`
//! - `{"__jsonclass__": ["PyObject", "<base64 blob>"]}`
//!
//! A blob is the opaque binary form of a `Value` (bincode). It is also the
//! body of `application/octet-stream` uploads and downloads, and the format
//! of stored checkpoints.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bincode::Options;
use serde_json::{Map, Number, Value as Json};

use crate::command::{Abort, Call, Command, CommandKind, Create, Get, Kwargs};
use crate::id::{IdError, ResultId};
use crate::value::{Slice, Value};

mod bounded;

/// Key marking a tagged value.
pub const JSONCLASS: &str = "__jsonclass__";

/// Deepest container nesting accepted when decoding a blob.
pub const MAX_DEPTH: usize = 128;

pub mod tags {
    pub const PROMISE: &str = "Promise";
    pub const SLICE: &str = "slice";
    pub const OPAQUE: &str = "PyObject";
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected an object with exactly one of: create, call, get, abort")]
    MissingKind,
    #[error("unknown command '{0}'")]
    UnknownKind(String),
    #[error("{field} is not a valid parameter for {kind}")]
    UnknownField { kind: CommandKind, field: String },
    #[error("{kind} is missing required field '{field}'")]
    MissingField { kind: CommandKind, field: &'static str },
    #[error("{kind} has both 'class' and 'class_'")]
    DuplicateField { kind: CommandKind },
    #[error("field '{field}' of {kind} must be {expected}")]
    FieldType {
        kind: CommandKind,
        field: String,
        expected: &'static str,
    },
    #[error("unknown {JSONCLASS} tag '{0}'")]
    UnknownTag(String),
    #[error("malformed {JSONCLASS} value: {0}")]
    MalformedTag(String),
    #[error("invalid result id: {0}")]
    Id(#[from] IdError),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid binary payload: {0}")]
    Blob(#[from] bincode::Error),
    #[error("binary payload nests deeper than {0} levels")]
    TooDeep(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;

// ── Blobs ────────────────────────────────────────────────────────────────────

/// Serialize a value to its opaque binary form.
pub fn encode_blob(value: &Value) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// Same layout as `bincode::serialize`.
fn blob_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Decode a blob, refusing containers nested deeper than `MAX_DEPTH`.
pub fn decode_blob(bytes: &[u8]) -> Result<Value> {
    blob_options()
        .deserialize_seed(bounded::ValueSeed::root(MAX_DEPTH), bytes)
        .map_err(|e| {
            if matches!(&*e, bincode::ErrorKind::Custom(msg) if msg == bounded::TOO_DEEP) {
                CodecError::TooDeep(MAX_DEPTH)
            } else {
                CodecError::Blob(e)
            }
        })
}

// ── Commands ─────────────────────────────────────────────────────────────────

/// Decode a JSON request body into a command.
pub fn decode_command(body: &[u8]) -> Result<Command> {
    let json: Json = serde_json::from_slice(body)?;
    command_from_json(json)
}

pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&command_to_json(command)?)?)
}

pub fn command_from_json(json: Json) -> Result<Command> {
    let Json::Object(outer) = json else {
        return Err(CodecError::MissingKind);
    };
    if outer.len() != 1 {
        return Err(CodecError::MissingKind);
    }
    let Some((key, body)) = outer.into_iter().next() else {
        return Err(CodecError::MissingKind);
    };
    let kind = CommandKind::parse(&key).ok_or(CodecError::UnknownKind(key))?;
    let Json::Object(mut fields) = body else {
        return Err(CodecError::FieldType {
            kind,
            field: kind.as_str().to_string(),
            expected: "an object",
        });
    };

    // Unknown fields fail here, before anything is queued.
    if let Some(unknown) = fields.keys().find(|k| !kind.fields().contains(&k.as_str())) {
        return Err(CodecError::UnknownField {
            kind,
            field: unknown.clone(),
        });
    }

    let command = match kind {
        CommandKind::Create => {
            if fields.contains_key("class") && fields.contains_key("class_") {
                return Err(CodecError::DuplicateField { kind });
            }
            let class = match fields.remove("class") {
                Some(v) => Some(v),
                None => fields.remove("class_"),
            };
            Command::Create(Create {
                module: take_string(kind, "module", fields.remove("module"))?,
                class: take_string(kind, "class", class)?,
                args: take_args(kind, fields.remove("args"))?,
                kwargs: take_kwargs(kind, fields.remove("kwargs"))?,
            })
        }
        CommandKind::Call => Command::Call(Call {
            object: take_object(kind, fields.remove("object"))?,
            method: take_string(kind, "method", fields.remove("method"))?,
            args: take_args(kind, fields.remove("args"))?,
            kwargs: take_kwargs(kind, fields.remove("kwargs"))?,
        }),
        CommandKind::Get => Command::Get(Get {
            object: take_object(kind, fields.remove("object"))?,
            member: match fields.remove("member") {
                None | Some(Json::Null) => String::new(),
                other => take_string(kind, "member", other)?,
            },
        }),
        CommandKind::Abort => {
            let raw = take_string(kind, "id", fields.remove("id"))?;
            Command::Abort(Abort {
                id: ResultId::parse(&raw)?,
            })
        }
    };
    Ok(command)
}

pub fn command_to_json(command: &Command) -> Result<Json> {
    let mut body = Map::new();
    match command {
        Command::Create(c) => {
            body.insert("module".into(), Json::String(c.module.clone()));
            body.insert("class".into(), Json::String(c.class.clone()));
            body.insert("args".into(), args_to_json(&c.args)?);
            body.insert("kwargs".into(), kwargs_to_json(&c.kwargs)?);
        }
        Command::Call(c) => {
            body.insert("object".into(), value_to_json(&c.object)?);
            body.insert("method".into(), Json::String(c.method.clone()));
            body.insert("args".into(), args_to_json(&c.args)?);
            body.insert("kwargs".into(), kwargs_to_json(&c.kwargs)?);
        }
        Command::Get(g) => {
            body.insert("object".into(), value_to_json(&g.object)?);
            body.insert("member".into(), Json::String(g.member.clone()));
        }
        Command::Abort(a) => {
            body.insert("id".into(), Json::String(a.id.to_string()));
        }
    }
    let mut outer = Map::new();
    outer.insert(command.kind().as_str().to_string(), Json::Object(body));
    Ok(Json::Object(outer))
}

fn take_string(kind: CommandKind, field: &'static str, raw: Option<Json>) -> Result<String> {
    match raw {
        Some(Json::String(s)) => Ok(s),
        Some(_) => Err(CodecError::FieldType {
            kind,
            field: field.to_string(),
            expected: "a string",
        }),
        None => Err(CodecError::MissingField { kind, field }),
    }
}

fn take_object(kind: CommandKind, raw: Option<Json>) -> Result<Value> {
    match raw {
        Some(json) => value_from_json(json),
        None => Err(CodecError::MissingField {
            kind,
            field: "object",
        }),
    }
}

fn take_args(kind: CommandKind, raw: Option<Json>) -> Result<Vec<Value>> {
    match raw {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(Json::Array(items)) => items.into_iter().map(value_from_json).collect(),
        Some(_) => Err(CodecError::FieldType {
            kind,
            field: "args".into(),
            expected: "an array",
        }),
    }
}

fn take_kwargs(kind: CommandKind, raw: Option<Json>) -> Result<Kwargs> {
    match raw {
        None | Some(Json::Null) => Ok(Kwargs::new()),
        Some(Json::Object(map)) => map
            .into_iter()
            .map(|(k, v)| Ok((k, value_from_json(v)?)))
            .collect(),
        Some(_) => Err(CodecError::FieldType {
            kind,
            field: "kwargs".into(),
            expected: "an object",
        }),
    }
}

fn args_to_json(args: &[Value]) -> Result<Json> {
    Ok(Json::Array(
        args.iter().map(value_to_json).collect::<Result<_>>()?,
    ))
}

fn kwargs_to_json(kwargs: &Kwargs) -> Result<Json> {
    let mut map = Map::new();
    for (k, v) in kwargs {
        map.insert(k.clone(), value_to_json(v)?);
    }
    Ok(Json::Object(map))
}

// ── Values ───────────────────────────────────────────────────────────────────

fn tagged(tag: &str, param: Json) -> Json {
    let mut map = Map::new();
    map.insert(
        JSONCLASS.to_string(),
        Json::Array(vec![Json::String(tag.to_string()), param]),
    );
    Json::Object(map)
}

fn opaque(value: &Value) -> Result<Json> {
    let blob = encode_blob(value)?;
    Ok(tagged(tags::OPAQUE, Json::String(BASE64.encode(blob))))
}

pub fn value_to_json(value: &Value) -> Result<Json> {
    let json = match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(f) => match Number::from_f64(*f) {
            Some(n) => Json::Number(n),
            None => opaque(value)?,
        },
        Value::Str(s) => Json::String(s.clone()),
        Value::List(items) => args_to_json(items)?,
        Value::Map(map) if map.contains_key(JSONCLASS) => opaque(value)?,
        Value::Map(map) => kwargs_to_json(map)?,
        Value::Slice(s) => {
            let bound = |b: Option<i64>| b.map_or(Json::Null, |v| Json::Number(v.into()));
            tagged(
                tags::SLICE,
                Json::Array(vec![bound(s.start), bound(s.stop), bound(s.step)]),
            )
        }
        Value::Promise(id) => tagged(tags::PROMISE, Json::String(id.to_string())),
        Value::Bytes(_) | Value::Instance(_) | Value::Failure(_) => opaque(value)?,
    };
    Ok(json)
}

pub fn value_from_json(json: Json) -> Result<Value> {
    let value = match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Str(s),
        Json::Array(items) => Value::List(
            items
                .into_iter()
                .map(value_from_json)
                .collect::<Result<_>>()?,
        ),
        Json::Object(mut map) => match map.remove(JSONCLASS) {
            Some(tag) if map.is_empty() => decode_tagged(tag)?,
            Some(_) => {
                return Err(CodecError::MalformedTag(format!(
                    "{JSONCLASS} must be the only key of its object"
                )))
            }
            None => Value::Map(
                map.into_iter()
                    .map(|(k, v)| Ok((k, value_from_json(v)?)))
                    .collect::<Result<_>>()?,
            ),
        },
    };
    Ok(value)
}

fn decode_tagged(tag: Json) -> Result<Value> {
    let Json::Array(mut pair) = tag else {
        return Err(CodecError::MalformedTag("expected [tag, param]".into()));
    };
    if pair.len() != 2 {
        return Err(CodecError::MalformedTag("expected [tag, param]".into()));
    }
    let param = pair.pop().unwrap_or(Json::Null);
    let Some(Json::String(name)) = pair.pop() else {
        return Err(CodecError::MalformedTag("tag name must be a string".into()));
    };

    match name.as_str() {
        tags::PROMISE => match param {
            Json::String(raw) => Ok(Value::Promise(ResultId::parse(&raw)?)),
            _ => Err(CodecError::MalformedTag("Promise id must be a string".into())),
        },
        tags::SLICE => decode_slice(param).map(Value::Slice),
        tags::OPAQUE => match param {
            Json::String(encoded) => decode_blob(&BASE64.decode(encoded.as_bytes())?),
            _ => Err(CodecError::MalformedTag("PyObject payload must be a string".into())),
        },
        _ => Err(CodecError::UnknownTag(name)),
    }
}

fn decode_slice(param: Json) -> Result<Slice> {
    let Json::Array(bounds) = param else {
        return Err(CodecError::MalformedTag("slice bounds must be an array".into()));
    };
    let bounds = bounds
        .into_iter()
        .map(|b| match b {
            Json::Null => Ok(None),
            Json::Number(n) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| CodecError::MalformedTag("slice bounds must be integers".into())),
            _ => Err(CodecError::MalformedTag("slice bounds must be integers".into())),
        })
        .collect::<Result<Vec<_>>>()?;

    // One bound means `stop`, matching the usual slice constructor.
    match bounds.as_slice() {
        [stop] => Ok(Slice::new(None, *stop, None)),
        [start, stop] => Ok(Slice::new(*start, *stop, None)),
        [start, stop, step] => Ok(Slice::new(*start, *stop, *step)),
        _ => Err(CodecError::MalformedTag("slice takes 1 to 3 bounds".into())),
    }
}
