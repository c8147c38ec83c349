//! Submitting commands.

use anyhow::{Context, Result, bail};
use serde_json::{Value as Json, json};

use remora_core::config::ServerAddress;
use remora_core::{ResultId, Value, codec};

use super::http::{base_url, get_value, post_json_text};

/// Submit a command given as JSON, e.g.
/// `{"create": {"module": "builtins", "class": "str", "args": ["hi"]}}`.
pub async fn cmd_submit(server: &ServerAddress, raw: &str) -> Result<()> {
    let body: Json = serde_json::from_str(raw).context("command is not valid JSON")?;
    // Validate locally first so typos are reported without a round trip.
    let command = codec::command_from_json(body.clone())?;
    let id = post_json_text(&format!("{}/{}", base_url(server), command.kind()), &body).await?;
    println!("{}", id.trim());
    Ok(())
}

pub async fn cmd_abort(server: &ServerAddress, id: &str) -> Result<()> {
    let target = ResultId::parse(id)?;
    let body = json!({ "abort": { "id": target.as_str() } });
    let reply = post_json_text(&format!("{}/abort", base_url(server)), &body).await?;
    let abort_id = ResultId::parse(reply.trim())?;

    match get_value(&format!("{}/object/{}", base_url(server), abort_id)).await? {
        Some(Value::Bool(true)) => println!("Abort raised for {}.", target.short()),
        Some(Value::Bool(false)) => println!("{} had already finished.", target.short()),
        other => bail!("unexpected abort result: {:?}", other),
    }
    Ok(())
}
