//! Result inspection commands.

use anyhow::Result;

use remora_core::config::ServerAddress;
use remora_core::{ResultId, Value};

use super::http::{base_url, get_text, get_value};

fn print_value(id: &ResultId, value: &Value) {
    match value {
        Value::Failure(failure) => {
            println!("  ┌─ {} failed", id.short());
            println!("  │  command : {}", failure.command);
            for upstream in &failure.context {
                println!("  │  caused by : {}", upstream);
            }
            println!("  └─ error   : {}", failure.error);
        }
        other => println!("{}", other.repr()),
    }
}

/// Wait for a result and print it.
pub async fn cmd_get(server: &ServerAddress, id: &str) -> Result<()> {
    let id = ResultId::parse(id)?;
    if let Some(value) = get_value(&format!("{}/object/{}", base_url(server), id)).await? {
        print_value(&id, &value);
    }
    Ok(())
}

pub async fn cmd_status(server: &ServerAddress, id: &str) -> Result<()> {
    let id = ResultId::parse(id)?;
    let status = get_text(&format!("{}/status/{}", base_url(server), id)).await?;
    println!("{}: {}", id.short(), status.trim());
    Ok(())
}

/// Print the result if ready, else the latest checkpoint.
pub async fn cmd_state(server: &ServerAddress, id: &str) -> Result<()> {
    let id = ResultId::parse(id)?;
    match get_value(&format!("{}/state/{}", base_url(server), id)).await? {
        Some(value) => print_value(&id, &value),
        None => println!("{}: no state yet", id.short()),
    }
    Ok(())
}
