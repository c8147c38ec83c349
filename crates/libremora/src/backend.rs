//! Backends: where a client's commands go.
//!
//! `HttpBackend` talks to a remote `remorad`; `LocalBackend` drives an
//! in-process `Engine`. Handles only see the `Backend` trait, so proxy code
//! is identical in both modes.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use remora_core::codec;
use remora_core::config::ServerAddress;
use remora_core::{Command, Contract, ResultId, Value};
use remora_services::{Engine, EngineError, Snapshot};

use crate::error::{ClientError, Result};

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Submit a command and return the id its outcome will land under.
    async fn submit(&self, command: &Command) -> Result<ResultId>;

    /// Store a value directly.
    async fn upload(&self, value: &Value) -> Result<ResultId>;

    /// Wait for an outcome. Failures come back as `Value::Failure`.
    async fn fetch(&self, id: &ResultId) -> Result<Value>;

    async fn ready(&self, id: &ResultId) -> Result<bool>;

    /// The result if ready, else the latest checkpoint, else `None`.
    async fn state(&self, id: &ResultId) -> Result<Option<Value>>;

    async fn contract(&self) -> Result<Contract>;
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

pub struct HttpBackend {
    client: reqwest::Client,
    base: String,
}

impl HttpBackend {
    pub fn new(addr: &ServerAddress) -> Self {
        Self::with_base_url(addr.base_url())
    }

    pub fn with_base_url(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn checked(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(ClientError::Http {
            status: status.as_u16(),
            message,
        })
    }

    async fn post(&self, path: &str, content_type: &str, body: Vec<u8>) -> Result<ResultId> {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        let text = Self::checked(resp).await?.text().await?;
        ResultId::parse(text.trim()).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await?;
        Self::checked(resp).await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn submit(&self, command: &Command) -> Result<ResultId> {
        let body = codec::encode_command(command)?;
        let path = format!("/{}", command.kind());
        let id = self.post(&path, "application/json", body).await?;
        tracing::debug!(id = id.short(), kind = %command.kind(), "command sent");
        Ok(id)
    }

    async fn upload(&self, value: &Value) -> Result<ResultId> {
        let body = codec::encode_blob(value)?;
        self.post("/", "application/octet-stream", body).await
    }

    async fn fetch(&self, id: &ResultId) -> Result<Value> {
        let bytes = self.get(&format!("/object/{}", id)).await?.bytes().await?;
        Ok(codec::decode_blob(&bytes)?)
    }

    async fn ready(&self, id: &ResultId) -> Result<bool> {
        let text = self.get(&format!("/status/{}", id)).await?.text().await?;
        match text.trim() {
            "ready" => Ok(true),
            "not ready" => Ok(false),
            other => Err(ClientError::Protocol(format!("unexpected status '{}'", other))),
        }
    }

    async fn state(&self, id: &ResultId) -> Result<Option<Value>> {
        let resp = self.get(&format!("/state/{}", id)).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let bytes = resp.bytes().await?;
        Ok(Some(codec::decode_blob(&bytes)?))
    }

    async fn contract(&self) -> Result<Contract> {
        Ok(self.get("/contract").await?.json::<Contract>().await?)
    }
}

// ── In-process ────────────────────────────────────────────────────────────────

/// Pass-through to an engine in the same process.
pub struct LocalBackend {
    engine: Engine,
}

impl LocalBackend {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

fn rejected(e: EngineError) -> ClientError {
    ClientError::Rejected(e.to_string())
}

#[async_trait]
impl Backend for LocalBackend {
    async fn submit(&self, command: &Command) -> Result<ResultId> {
        self.engine.submit(command.clone()).map_err(rejected)
    }

    async fn upload(&self, value: &Value) -> Result<ResultId> {
        self.engine.store(value.clone()).map_err(rejected)
    }

    async fn fetch(&self, id: &ResultId) -> Result<Value> {
        let value = self.engine.fetch(id).await.map_err(rejected)?;
        Ok(Value::clone(&value))
    }

    async fn ready(&self, id: &ResultId) -> Result<bool> {
        self.engine
            .status(id)
            .ok_or_else(|| ClientError::Rejected(format!("unknown result {}", id)))
    }

    async fn state(&self, id: &ResultId) -> Result<Option<Value>> {
        match self.engine.state(id).map_err(rejected)? {
            Snapshot::Result(value) => Ok(Some(Value::clone(&value))),
            Snapshot::Checkpoint(blob) => Ok(Some(codec::decode_blob(&blob)?)),
            Snapshot::Empty => Ok(None),
        }
    }

    async fn contract(&self) -> Result<Contract> {
        Ok(self.engine.contract())
    }
}
