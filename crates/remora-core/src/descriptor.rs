//! Class descriptors: what a client may do with a remote object.
//!
//! The server builds one descriptor per registered class and publishes the
//! full set as a `Contract` on `GET /contract`. Clients cache descriptors by
//! qualified name and use them to type handles.

use serde::{Deserialize, Serialize};

/// Dunder methods that are proxied in addition to public ones.
pub const SPECIAL_METHODS: [&str; 4] = ["__getitem__", "__call__", "__len__", "__str__"];

/// Methods whose result is fetched immediately instead of returned as a handle.
pub const SYNCHRONOUS_METHODS: [&str; 2] = ["__len__", "__str__"];

/// Whether a method with this name is exposed through a proxy.
pub fn is_proxyable(name: &str) -> bool {
    !name.starts_with("__") || SPECIAL_METHODS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    #[serde(default)]
    pub synchronous: bool,
    /// Qualified class name of the return value, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let synchronous = SYNCHRONOUS_METHODS.contains(&name.as_str());
        Self {
            name,
            synchronous,
            returns: None,
        }
    }

    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }

    pub fn returning(mut self, class: impl Into<String>) -> Self {
        self.returns = Some(class.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub module: String,
    /// Dotted path inside the module; `Outer.Inner` for nested classes.
    pub name: String,
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
    #[serde(default)]
    pub attributes: Vec<String>,
    /// Class-level constructors reached as `Class.factory`.
    #[serde(default)]
    pub factories: Vec<MethodDescriptor>,
}

impl ClassDescriptor {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            methods: Vec::new(),
            attributes: Vec::new(),
            factories: Vec::new(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn factory(&self, name: &str) -> Option<&MethodDescriptor> {
        self.factories.iter().find(|m| m.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    /// Iteration is synthesized from `__len__` and `__getitem__`.
    pub fn is_iterable(&self) -> bool {
        self.method("__len__").is_some() && self.method("__getitem__").is_some()
    }
}

/// Every class a server can instantiate or operate on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub classes: Vec<ClassDescriptor>,
}

impl Contract {
    pub fn find(&self, qualified_name: &str) -> Option<&ClassDescriptor> {
        self.classes
            .iter()
            .find(|c| c.qualified_name() == qualified_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_methods_are_proxyable() {
        assert!(is_proxyable("split"));
        assert!(is_proxyable("__getitem__"));
        assert!(is_proxyable("__len__"));
        assert!(!is_proxyable("__init__"));
        assert!(!is_proxyable("__repr__"));
    }

    #[test]
    fn len_and_str_default_to_synchronous() {
        assert!(MethodDescriptor::new("__len__").synchronous);
        assert!(MethodDescriptor::new("__str__").synchronous);
        assert!(!MethodDescriptor::new("__getitem__").synchronous);
        assert!(MethodDescriptor::new("size").synchronous().synchronous);
    }

    #[test]
    fn contract_serializes_and_finds_by_qualified_name() {
        let mut class = ClassDescriptor::new("shapes", "Outer.Circle");
        class.methods.push(MethodDescriptor::new("area").returning("builtins.float"));
        class.methods.push(MethodDescriptor::new("__len__"));
        class.methods.push(MethodDescriptor::new("__getitem__"));
        class.attributes.push("radius".into());
        let contract = Contract {
            classes: vec![class],
        };

        let json = serde_json::to_string(&contract).unwrap();
        let back: Contract = serde_json::from_str(&json).unwrap();
        let found = back.find("shapes.Outer.Circle").unwrap();
        assert_eq!(
            found.method("area").unwrap().returns.as_deref(),
            Some("builtins.float")
        );
        assert!(found.has_attribute("radius"));
        assert!(found.is_iterable());
        assert!(back.find("shapes.Circle").is_none());
    }
}
