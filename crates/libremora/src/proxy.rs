//! Client-side stand-ins for remote classes.

use std::sync::Arc;

use remora_core::command::Kwargs;
use remora_core::{ClassDescriptor, Command, Value};

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::handle::RemoteHandle;

/// A remote class. Instantiating it submits a `create` command.
#[derive(Clone)]
pub struct ProxyClass {
    client: Client,
    module: String,
    name: String,
    descriptor: Option<Arc<ClassDescriptor>>,
}

impl ProxyClass {
    pub(crate) fn typed(client: Client, descriptor: Arc<ClassDescriptor>) -> Self {
        Self {
            client,
            module: descriptor.module.clone(),
            name: descriptor.name.clone(),
            descriptor: Some(descriptor),
        }
    }

    pub(crate) fn untyped(client: Client, module: &str, name: &str) -> Self {
        Self {
            client,
            module: module.to_string(),
            name: name.to_string(),
            descriptor: None,
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    /// `None` for untyped proxies.
    pub fn descriptor(&self) -> Option<&Arc<ClassDescriptor>> {
        self.descriptor.as_ref()
    }

    pub async fn new_instance(&self, args: Vec<Value>) -> Result<RemoteHandle> {
        self.new_instance_with(args, Kwargs::new()).await
    }

    pub async fn new_instance_with(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<RemoteHandle> {
        let command = Command::create(&self.module, &self.name, args).with_kwargs(kwargs);
        let id = self.client.backend().submit(&command).await?;
        Ok(RemoteHandle::new(self.client.clone(), id, self.descriptor.clone()))
    }

    /// Invoke the class-level factory `name`.
    ///
    /// The handle is typed by the factory's declared return class, falling
    /// back to this class.
    pub async fn factory(&self, name: &str, args: Vec<Value>) -> Result<RemoteHandle> {
        let hint = match &self.descriptor {
            Some(class) => {
                let factory = class.factory(name).ok_or_else(|| ClientError::UnknownMember {
                    class: class.qualified_name(),
                    member: name.to_string(),
                })?;
                self.client
                    .hinted(factory.returns.as_deref())
                    .or_else(|| Some(class.clone()))
            }
            None => None,
        };
        let path = format!("{}.{}", self.name, name);
        let command = Command::create(&self.module, path, args);
        let id = self.client.backend().submit(&command).await?;
        Ok(RemoteHandle::new(self.client.clone(), id, hint))
    }
}
