//! Class registry: the catalogue of everything a client can instantiate.
//!
//! A class is declared once as a `ClassDef` (constructor, methods, attributes,
//! class-level factories, nested classes) and registered under a module name.
//! Dispatch is by qualified name: `Create` looks up `module.Class`, while
//! `Call` and `Get` look up the runtime class of the target value, so builtin
//! values and registered instances go through the same path.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use remora_core::command::{Call, Command, Create, Get, Kwargs};
use remora_core::descriptor::{self, ClassDescriptor, Contract, MethodDescriptor};
use remora_core::{ExecutionFailure, Instance, Value};

use crate::execution::StateError;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("no module named '{0}'")]
    NoModule(String),
    #[error("module '{module}' has no class '{class}'")]
    NoClass { module: String, class: String },
    #[error("'{class}' object has no attribute '{member}'")]
    NoAttribute { class: String, member: String },
    #[error("type error: {0}")]
    Type(String),
    #[error("value error: {0}")]
    Value(String),
    #[error("index error: {0}")]
    Index(String),
    #[error("key error: {0}")]
    Key(String),
    #[error("operation was aborted")]
    Aborted,
    #[error("{0}")]
    Upstream(ExecutionFailure),
    #[error("abort commands are handled by the engine")]
    NotExecutable,
    #[error(transparent)]
    State(#[from] StateError),
    #[error("{0}")]
    Other(String),
}

pub type Constructor = Arc<dyn Fn(Args) -> Result<Value, ExecError> + Send + Sync>;
pub type MethodFn = Arc<dyn Fn(&Value, Args) -> Result<Value, ExecError> + Send + Sync>;
pub type Getter = Arc<dyn Fn(&Value) -> Result<Value, ExecError> + Send + Sync>;

/// Positional and keyword arguments of one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keyword: Kwargs,
}

impl Args {
    pub fn new(positional: Vec<Value>, keyword: Kwargs) -> Self {
        Self {
            positional,
            keyword,
        }
    }

    /// Argument by position, falling back to keyword `name`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.keyword.get(name))
    }

    pub fn required(&self, index: usize, name: &str) -> Result<&Value, ExecError> {
        self.get(index, name)
            .ok_or_else(|| ExecError::Type(format!("missing required argument '{}'", name)))
    }

    pub fn str(&self, index: usize, name: &str) -> Result<&str, ExecError> {
        let value = self.required(index, name)?;
        value.as_str().ok_or_else(|| {
            ExecError::Type(format!("'{}' must be str, not {}", name, value.class_name()))
        })
    }

    pub fn int(&self, index: usize, name: &str) -> Result<i64, ExecError> {
        let value = self.required(index, name)?;
        value.as_int().ok_or_else(|| {
            ExecError::Type(format!("'{}' must be int, not {}", name, value.class_name()))
        })
    }

    /// Fail if more than `max` positional arguments were passed.
    pub fn at_most(&self, max: usize, callee: &str) -> Result<(), ExecError> {
        if self.positional.len() > max {
            return Err(ExecError::Type(format!(
                "{}() takes at most {} arguments ({} given)",
                callee,
                max,
                self.positional.len()
            )));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

#[derive(Clone)]
enum Ctor {
    /// Bare instance; any argument is an error.
    Empty,
    /// Positional or keyword arguments become instance fields.
    Fields(Vec<String>),
    Custom(Constructor),
}

#[derive(Clone)]
struct MethodDef {
    func: MethodFn,
    synchronous: bool,
    returns: Option<String>,
}

#[derive(Clone)]
struct FactoryDef {
    func: Constructor,
    returns: Option<String>,
}

/// Declaration of one class.
#[derive(Clone)]
pub struct ClassDef {
    name: String,
    ctor: Ctor,
    methods: BTreeMap<String, MethodDef>,
    attributes: BTreeMap<String, Getter>,
    factories: BTreeMap<String, FactoryDef>,
    nested: Vec<ClassDef>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ctor: Ctor::Empty,
            methods: BTreeMap::new(),
            attributes: BTreeMap::new(),
            factories: BTreeMap::new(),
            nested: Vec::new(),
        }
    }

    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(Args) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        self.ctor = Ctor::Custom(Arc::new(f));
        self
    }

    /// Construct instances whose fields are the named constructor arguments.
    /// Each field is also readable as an attribute.
    pub fn fields(mut self, names: &[&str]) -> Self {
        for name in names {
            self = self.field(name);
        }
        self.ctor = Ctor::Fields(names.iter().map(|n| n.to_string()).collect());
        self
    }

    /// Expose an instance field as an attribute.
    pub fn field(self, name: &str) -> Self {
        let key = name.to_string();
        self.attribute(name, move |object| match object {
            Value::Instance(instance) => instance
                .fields
                .get(&key)
                .cloned()
                .ok_or_else(|| ExecError::NoAttribute {
                    class: instance.class.clone(),
                    member: key.clone(),
                }),
            other => Err(ExecError::NoAttribute {
                class: other.class_name().to_string(),
                member: key.clone(),
            }),
        })
    }

    pub fn method<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&Value, Args) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        let synchronous = descriptor::SYNCHRONOUS_METHODS.contains(&name);
        self.insert_method(name, Arc::new(f), synchronous, None)
    }

    /// A method whose result clients fetch immediately.
    pub fn sync_method<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&Value, Args) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        self.insert_method(name, Arc::new(f), true, None)
    }

    /// A method annotated with the qualified class of its result.
    pub fn method_returning<F>(self, name: &str, returns: &str, f: F) -> Self
    where
        F: Fn(&Value, Args) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        let synchronous = descriptor::SYNCHRONOUS_METHODS.contains(&name);
        self.insert_method(name, Arc::new(f), synchronous, Some(returns.to_string()))
    }

    fn insert_method(
        mut self,
        name: &str,
        func: MethodFn,
        synchronous: bool,
        returns: Option<String>,
    ) -> Self {
        self.methods.insert(
            name.to_string(),
            MethodDef {
                func,
                synchronous,
                returns,
            },
        );
        self
    }

    pub fn attribute<F>(mut self, name: &str, getter: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        self.attributes.insert(name.to_string(), Arc::new(getter));
        self
    }

    /// Class-level constructor reached as `Class.name`. Its result is typed as
    /// the class itself.
    pub fn factory<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Args) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        self.factories.insert(
            name.to_string(),
            FactoryDef {
                func: Arc::new(f),
                returns: None,
            },
        );
        self
    }

    /// Class-level function annotated with the qualified class of its result.
    pub fn factory_returning<F>(mut self, name: &str, returns: &str, f: F) -> Self
    where
        F: Fn(Args) -> Result<Value, ExecError> + Send + Sync + 'static,
    {
        self.factories.insert(
            name.to_string(),
            FactoryDef {
                func: Arc::new(f),
                returns: Some(returns.to_string()),
            },
        );
        self
    }

    pub fn nested(mut self, class: ClassDef) -> Self {
        self.nested.push(class);
        self
    }
}

/// A registered class with its location.
struct Entry {
    module: String,
    /// Dotted path inside the module.
    path: String,
    def: ClassDef,
}

impl Entry {
    fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.path)
    }

    fn construct(&self, args: Args) -> Result<Value, ExecError> {
        match &self.def.ctor {
            Ctor::Custom(f) => f(args),
            Ctor::Empty if args.is_empty() => Ok(Instance::new(self.qualified_name()).into()),
            Ctor::Empty => Err(ExecError::Type(format!("{}() takes no arguments", self.path))),
            Ctor::Fields(names) => {
                args.at_most(names.len(), &self.path)?;
                let mut instance = Instance::new(self.qualified_name());
                for (i, name) in names.iter().enumerate() {
                    if let Some(v) = args.get(i, name) {
                        instance.fields.insert(name.clone(), v.clone());
                    }
                }
                if let Some(extra) = args.keyword.keys().find(|k| !names.contains(k)) {
                    return Err(ExecError::Type(format!(
                        "{}() got an unexpected keyword argument '{}'",
                        self.path, extra
                    )));
                }
                Ok(instance.into())
            }
        }
    }

    fn descriptor(&self) -> ClassDescriptor {
        let qualified = self.qualified_name();
        let mut desc = ClassDescriptor::new(&self.module, &self.path);
        desc.methods = self
            .def
            .methods
            .iter()
            .filter(|(name, _)| descriptor::is_proxyable(name))
            .map(|(name, m)| MethodDescriptor {
                name: name.clone(),
                synchronous: m.synchronous,
                returns: m.returns.clone(),
            })
            .collect();
        desc.attributes = self.def.attributes.keys().cloned().collect();
        desc.factories = self
            .def
            .factories
            .iter()
            .map(|(name, f)| MethodDescriptor {
                name: name.clone(),
                synchronous: false,
                returns: Some(f.returns.clone().unwrap_or_else(|| qualified.clone())),
            })
            .collect();
        desc
    }
}

/// All registered classes, indexed by qualified name.
#[derive(Default)]
pub struct Registry {
    modules: BTreeSet<String>,
    classes: HashMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the `builtins` module.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register(&mut registry);
        registry
    }

    /// Register `class` (and its nested classes) under `module`.
    pub fn register(&mut self, module: &str, class: ClassDef) -> &mut Self {
        self.modules.insert(module.to_string());
        self.insert(module, None, class);
        self
    }

    fn insert(&mut self, module: &str, parent: Option<&str>, mut class: ClassDef) {
        let path = match parent {
            Some(parent) => format!("{}.{}", parent, class.name),
            None => class.name.clone(),
        };
        for nested in std::mem::take(&mut class.nested) {
            self.insert(module, Some(&path), nested);
        }
        let entry = Entry {
            module: module.to_string(),
            path,
            def: class,
        };
        tracing::debug!(class = %entry.qualified_name(), "class registered");
        self.classes.insert(entry.qualified_name(), entry);
    }

    /// Descriptors of every registered class, sorted by qualified name.
    pub fn contract(&self) -> Contract {
        let mut classes: Vec<ClassDescriptor> =
            self.classes.values().map(Entry::descriptor).collect();
        classes.sort_by_key(ClassDescriptor::qualified_name);
        Contract { classes }
    }

    /// Instantiate `module.class`. A dotted `class` reaches nested classes,
    /// and a trailing segment that names a factory calls the factory.
    pub fn create(&self, module: &str, class: &str, args: Args) -> Result<Value, ExecError> {
        if !self.modules.contains(module) {
            return Err(ExecError::NoModule(module.to_string()));
        }
        if let Some(entry) = self.classes.get(&format!("{}.{}", module, class)) {
            return entry.construct(args);
        }
        let no_class = || ExecError::NoClass {
            module: module.to_string(),
            class: class.to_string(),
        };
        let (owner, factory) = class.rsplit_once('.').ok_or_else(no_class)?;
        let entry = self
            .classes
            .get(&format!("{}.{}", module, owner))
            .ok_or_else(no_class)?;
        let factory = entry.def.factories.get(factory).ok_or_else(no_class)?;
        (factory.func)(args)
    }

    /// Invoke `method` on `object` through its runtime class.
    pub fn call(&self, object: &Value, method: &str, args: Args) -> Result<Value, ExecError> {
        if let Value::Failure(failure) = object {
            return Err(ExecError::Upstream(failure.clone()));
        }
        let class = object.class_name();
        let method_def = self
            .classes
            .get(class)
            .and_then(|entry| entry.def.methods.get(method))
            .ok_or_else(|| ExecError::NoAttribute {
                class: class.to_string(),
                member: method.to_string(),
            })?;
        (method_def.func)(object, args)
    }

    /// Read `member` off `object`; an empty member is the object itself.
    pub fn get_attr(&self, object: &Value, member: &str) -> Result<Value, ExecError> {
        if let Value::Failure(failure) = object {
            return Err(ExecError::Upstream(failure.clone()));
        }
        if member.is_empty() {
            return Ok(object.clone());
        }
        let class = object.class_name();
        if let Some(getter) = self
            .classes
            .get(class)
            .and_then(|entry| entry.def.attributes.get(member))
        {
            return getter(object);
        }
        match object {
            Value::Instance(instance) if instance.fields.contains_key(member) => {
                Ok(instance.fields[member].clone())
            }
            _ => Err(ExecError::NoAttribute {
                class: class.to_string(),
                member: member.to_string(),
            }),
        }
    }

    /// Run a resolved command.
    pub fn execute(&self, command: &Command) -> Result<Value, ExecError> {
        if let Some(failure) = upstream_failure(command) {
            return Err(ExecError::Upstream(failure.clone()));
        }
        match command {
            Command::Create(Create {
                module,
                class,
                args,
                kwargs,
            }) => self.create(module, class, Args::new(args.clone(), kwargs.clone())),
            Command::Call(Call {
                object,
                method,
                args,
                kwargs,
            }) => self.call(object, method, Args::new(args.clone(), kwargs.clone())),
            Command::Get(Get { object, member }) => self.get_attr(object, member),
            Command::Abort(_) => Err(ExecError::NotExecutable),
        }
    }
}

/// First failure among the resolved arguments of `command`.
fn upstream_failure(command: &Command) -> Option<&ExecutionFailure> {
    let (object, args, kwargs) = match command {
        Command::Create(c) => (None, c.args.as_slice(), Some(&c.kwargs)),
        Command::Call(c) => (Some(&c.object), c.args.as_slice(), Some(&c.kwargs)),
        Command::Get(g) => (Some(&g.object), &[][..], None),
        Command::Abort(_) => return None,
    };
    object
        .into_iter()
        .chain(args)
        .chain(kwargs.into_iter().flat_map(|k| k.values()))
        .find_map(Value::as_failure)
}
