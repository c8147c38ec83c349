//! The command protocol: Create, Call, Get and Abort.
//!
//! Commands are built per call and are immutable apart from promise
//! resolution, which rewrites their argument fields in place just before
//! execution. Which fields are resolvable depends on the kind:
//!
//! | kind   | resolvable fields        |
//! |--------|--------------------------|
//! | Create | `args`, `kwargs`         |
//! | Call   | `object`, `args`, `kwargs` |
//! | Get    | `object`                 |
//! | Abort  | none                     |

use std::collections::BTreeMap;
use std::fmt;

use crate::id::ResultId;
use crate::value::Value;

pub type Kwargs = BTreeMap<String, Value>;

/// Instantiate `class` from namespace `module`.
///
/// `class` is a dotted path: `Outer.Inner` reaches a nested class and
/// `Class.factory` reaches a class-level factory.
#[derive(Debug, Clone, PartialEq)]
pub struct Create {
    pub module: String,
    pub class: String,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

/// Invoke `method` on `object`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub object: Value,
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

/// Read `member` off `object`, or the object itself when `member` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Get {
    pub object: Value,
    pub member: String,
}

/// Cancel the unit of work submitted under `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Abort {
    pub id: ResultId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create(Create),
    Call(Call),
    Get(Get),
    Abort(Abort),
}

/// Discriminator used on the wire and in URL paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Create,
    Call,
    Get,
    Abort,
}

impl CommandKind {
    pub const ALL: [CommandKind; 4] = [
        CommandKind::Create,
        CommandKind::Call,
        CommandKind::Get,
        CommandKind::Abort,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Create => "create",
            CommandKind::Call => "call",
            CommandKind::Get => "get",
            CommandKind::Abort => "abort",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == raw)
    }

    /// Field names a command of this kind may carry.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            CommandKind::Create => &["module", "class_", "class", "args", "kwargs"],
            CommandKind::Call => &["object", "method", "args", "kwargs"],
            CommandKind::Get => &["object", "member"],
            CommandKind::Abort => &["id"],
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Command {
    pub fn create(module: impl Into<String>, class: impl Into<String>, args: Vec<Value>) -> Self {
        Command::Create(Create {
            module: module.into(),
            class: class.into(),
            args,
            kwargs: Kwargs::new(),
        })
    }

    pub fn call(object: impl Into<Value>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Command::Call(Call {
            object: object.into(),
            method: method.into(),
            args,
            kwargs: Kwargs::new(),
        })
    }

    pub fn get(object: impl Into<Value>, member: impl Into<String>) -> Self {
        Command::Get(Get {
            object: object.into(),
            member: member.into(),
        })
    }

    pub fn abort(id: ResultId) -> Self {
        Command::Abort(Abort { id })
    }

    /// Attach keyword arguments. No-op for kinds without kwargs.
    pub fn with_kwargs(mut self, kwargs: Kwargs) -> Self {
        match &mut self {
            Command::Create(c) => c.kwargs = kwargs,
            Command::Call(c) => c.kwargs = kwargs,
            Command::Get(_) | Command::Abort(_) => {}
        }
        self
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Create(_) => CommandKind::Create,
            Command::Call(_) => CommandKind::Call,
            Command::Get(_) => CommandKind::Get,
            Command::Abort(_) => CommandKind::Abort,
        }
    }

    /// Every promise id referenced anywhere in the command.
    pub fn promises(&self) -> Vec<&ResultId> {
        let mut out = Vec::new();
        match self {
            Command::Create(c) => {
                c.args.iter().for_each(|v| out.extend(v.promises()));
                c.kwargs.values().for_each(|v| out.extend(v.promises()));
            }
            Command::Call(c) => {
                out.extend(c.object.promises());
                c.args.iter().for_each(|v| out.extend(v.promises()));
                c.kwargs.values().for_each(|v| out.extend(v.promises()));
            }
            Command::Get(g) => out.extend(g.object.promises()),
            Command::Abort(_) => {}
        }
        out
    }
}

fn render_args(args: &[Value], kwargs: &Kwargs) -> String {
    let mut parts: Vec<String> = args.iter().map(Value::repr).collect();
    parts.extend(kwargs.iter().map(|(k, v)| format!("{}={}", k, v.repr())));
    parts.join(", ")
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Create(c) => write!(
                f,
                "{}.{}({})",
                c.module,
                c.class,
                render_args(&c.args, &c.kwargs)
            ),
            Command::Call(c) => write!(
                f,
                "{}.{}({})",
                c.object.repr(),
                c.method,
                render_args(&c.args, &c.kwargs)
            ),
            Command::Get(g) if g.member.is_empty() => write!(f, "{}", g.object.repr()),
            Command::Get(g) => write!(f, "{}.{}", g.object.repr(), g.member),
            Command::Abort(a) => write!(f, "abort({})", a.id),
        }
    }
}
