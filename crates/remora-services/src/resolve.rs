//! Promise resolution.
//!
//! Before a command runs, promises in its argument fields are replaced by the
//! values they point at, waiting for each one. Resolution reaches:
//!   - the field itself (`object`),
//!   - elements of a list-valued field (`args`, or an `object` that is a list),
//!   - values of the `kwargs` map.
//!
//! Anything nested deeper is passed through untouched.

use remora_core::command::{Command, Kwargs};
use remora_core::Value;

use crate::result_store::{ResultStore, StoreError};

pub async fn resolve(command: &mut Command, store: &ResultStore) -> Result<(), StoreError> {
    match command {
        Command::Create(c) => {
            resolve_all(&mut c.args, store).await?;
            resolve_kwargs(&mut c.kwargs, store).await?;
        }
        Command::Call(c) => {
            resolve_field(&mut c.object, store).await?;
            resolve_all(&mut c.args, store).await?;
            resolve_kwargs(&mut c.kwargs, store).await?;
        }
        Command::Get(g) => resolve_field(&mut g.object, store).await?,
        Command::Abort(_) => {}
    }
    Ok(())
}

async fn resolve_one(value: &mut Value, store: &ResultStore) -> Result<(), StoreError> {
    if let Value::Promise(id) = value {
        let resolved = store.get(id).await?;
        *value = Value::clone(&resolved);
    }
    Ok(())
}

async fn resolve_all(values: &mut [Value], store: &ResultStore) -> Result<(), StoreError> {
    for value in values {
        resolve_one(value, store).await?;
    }
    Ok(())
}

async fn resolve_field(value: &mut Value, store: &ResultStore) -> Result<(), StoreError> {
    match value {
        Value::List(items) => resolve_all(items, store).await,
        other => resolve_one(other, store).await,
    }
}

async fn resolve_kwargs(kwargs: &mut Kwargs, store: &ResultStore) -> Result<(), StoreError> {
    for value in kwargs.values_mut() {
        resolve_one(value, store).await?;
    }
    Ok(())
}
