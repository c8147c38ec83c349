//! Handles to remote results.
//!
//! A handle is an id plus, when the class is known, its descriptor. Every
//! operation on a handle becomes a command whose arguments may include other
//! handles, so whole call graphs are submitted before anything is fetched.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use remora_core::command::Kwargs;
use remora_core::{ClassDescriptor, Command, ResultId, Value};

use crate::client::Client;
use crate::error::{ClientError, Result};

/// What a method call produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Asynchronous methods return a handle to the pending result.
    Handle(RemoteHandle),
    /// Synchronous methods (`__len__`, `__str__`) are fetched right away.
    Value(Value),
}

impl Outcome {
    pub fn into_handle(self) -> Option<RemoteHandle> {
        match self {
            Outcome::Handle(h) => Some(h),
            Outcome::Value(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Outcome::Value(v) => Some(v),
            Outcome::Handle(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct RemoteHandle {
    client: Client,
    id: ResultId,
    descriptor: Option<Arc<ClassDescriptor>>,
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("id", &self.id.short())
            .field(
                "class",
                &self.descriptor.as_ref().map(|d| d.qualified_name()),
            )
            .finish()
    }
}

impl RemoteHandle {
    pub(crate) fn new(
        client: Client,
        id: ResultId,
        descriptor: Option<Arc<ClassDescriptor>>,
    ) -> Self {
        Self {
            client,
            id,
            descriptor,
        }
    }

    pub fn id(&self) -> &ResultId {
        &self.id
    }

    /// `None` for untyped handles, which accept any member name.
    pub fn descriptor(&self) -> Option<&Arc<ClassDescriptor>> {
        self.descriptor.as_ref()
    }

    /// This handle as a command argument.
    pub fn promise(&self) -> Value {
        Value::Promise(self.id.clone())
    }

    fn unknown(&self, class: &ClassDescriptor, member: &str) -> ClientError {
        ClientError::UnknownMember {
            class: class.qualified_name(),
            member: member.to_string(),
        }
    }

    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Outcome> {
        self.call_with(method, args, Kwargs::new()).await
    }

    /// Invoke `method` on the remote object.
    ///
    /// Typed handles reject methods their class does not publish. The result
    /// is typed by the method's declared return class when the catalogue
    /// knows it.
    pub async fn call_with(&self, method: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Outcome> {
        let (synchronous, hint) = match &self.descriptor {
            Some(class) => {
                let m = class
                    .method(method)
                    .ok_or_else(|| self.unknown(class, method))?;
                (m.synchronous, self.client.hinted(m.returns.as_deref()))
            }
            None => (
                remora_core::descriptor::SYNCHRONOUS_METHODS.contains(&method),
                None,
            ),
        };

        let command = Command::call(self.promise(), method, args).with_kwargs(kwargs);
        let id = self.client.backend().submit(&command).await?;
        if synchronous {
            return Ok(Outcome::Value(self.client.fetch_value(&id).await?));
        }
        Ok(Outcome::Handle(RemoteHandle::new(self.client.clone(), id, hint)))
    }

    /// Call a method and always get a handle back, even for synchronous ones.
    pub async fn method(&self, method: &str, args: Vec<Value>) -> Result<RemoteHandle> {
        let hint = match &self.descriptor {
            Some(class) => {
                let m = class
                    .method(method)
                    .ok_or_else(|| self.unknown(class, method))?;
                self.client.hinted(m.returns.as_deref())
            }
            None => None,
        };
        let command = Command::call(self.promise(), method, args);
        let id = self.client.backend().submit(&command).await?;
        Ok(RemoteHandle::new(self.client.clone(), id, hint))
    }

    /// Call a method and wait for its value.
    pub async fn fetch_call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        match self.call(method, args).await? {
            Outcome::Value(v) => Ok(v),
            Outcome::Handle(h) => h.get().await,
        }
    }

    pub async fn len(&self) -> Result<usize> {
        match self.fetch_call("__len__", vec![]).await? {
            Value::Int(n) if n >= 0 => Ok(n as usize),
            other => Err(ClientError::Protocol(format!(
                "__len__ returned {}",
                other.repr()
            ))),
        }
    }

    /// The remote object's `__str__`.
    pub async fn to_text(&self) -> Result<String> {
        match self.fetch_call("__str__", vec![]).await? {
            Value::Str(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    /// `object[index]`, where `index` may itself be a handle or a slice.
    pub async fn item(&self, index: impl Into<Value>) -> Result<RemoteHandle> {
        self.method("__getitem__", vec![index.into()]).await
    }

    /// Read an attribute. The result is untyped.
    pub async fn attr(&self, name: &str) -> Result<RemoteHandle> {
        if let Some(class) = &self.descriptor {
            if !class.has_attribute(name) {
                return Err(self.unknown(class, name));
            }
        }
        let command = Command::get(self.promise(), name);
        let id = self.client.backend().submit(&command).await?;
        Ok(RemoteHandle::new(self.client.clone(), id, None))
    }

    /// Wait for the value. A remote failure is returned as `ClientError::Remote`.
    pub async fn get(&self) -> Result<Value> {
        self.client.fetch_value(&self.id).await
    }

    pub async fn ready(&self) -> Result<bool> {
        self.client.backend().ready(&self.id).await
    }

    /// The result if ready, else the latest checkpoint.
    pub async fn state(&self) -> Result<Option<Value>> {
        self.client.backend().state(&self.id).await
    }

    /// Ask the server to cancel this unit. `true` if it was still unfinished.
    pub async fn abort(&self) -> Result<bool> {
        let id = self
            .client
            .backend()
            .submit(&Command::abort(self.id.clone()))
            .await?;
        match self.client.fetch_value(&id).await? {
            Value::Bool(hit) => Ok(hit),
            other => Err(ClientError::Protocol(format!(
                "abort returned {}",
                other.repr()
            ))),
        }
    }

    /// Handles to `self[0]` .. `self[len - 1]`.
    ///
    /// The length is fetched once when the stream is first polled; items are
    /// submitted one at a time after that.
    pub fn iter(&self) -> Result<BoxStream<'_, Result<RemoteHandle>>> {
        if let Some(class) = &self.descriptor {
            if !class.is_iterable() {
                return Err(ClientError::NotIterable(class.qualified_name()));
            }
        }
        Ok(stream::once(self.len())
            .map_ok(move |len| stream::iter(0..len).then(move |i| self.item(i)))
            .try_flatten()
            .boxed())
    }
}

impl From<&RemoteHandle> for Value {
    fn from(handle: &RemoteHandle) -> Self {
        handle.promise()
    }
}
