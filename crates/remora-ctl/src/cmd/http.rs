//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result, bail};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde_json::Value as Json;

use remora_core::codec;
use remora_core::config::ServerAddress;
use remora_core::Value;

pub fn base_url(server: &ServerAddress) -> String {
    server.base_url()
}

async fn checked(url: &str, resp: reqwest::Result<Response>) -> Result<Response> {
    let resp = resp.with_context(|| {
        format!("failed to connect to remorad at {}, is it running?", url)
    })?;
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        bail!("server returned {}: {}", status, message.trim());
    }
    Ok(resp)
}

pub async fn get(url: &str) -> Result<Response> {
    checked(url, reqwest::get(url).await).await
}

pub async fn get_text(url: &str) -> Result<String> {
    get(url).await?.text().await.context("failed to read response")
}

/// GET a blob endpoint. `None` on 204.
pub async fn get_value(url: &str) -> Result<Option<Value>> {
    let resp = get(url).await?;
    if resp.status() == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    let bytes = resp.bytes().await.context("failed to read response")?;
    Ok(Some(codec::decode_blob(&bytes).context("failed to decode result")?))
}

/// POST a JSON body and return the text reply.
pub async fn post_json_text(url: &str, body: &Json) -> Result<String> {
    let resp = reqwest::Client::new()
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(serde_json::to_vec(body)?)
        .send()
        .await;
    checked(url, resp)
        .await?
        .text()
        .await
        .context("failed to read response")
}
