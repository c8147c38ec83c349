//! Remora integration test harness.
//!
//! Every test starts its own engine and HTTP server on an ephemeral port,
//! with a checkpoint directory that is removed when the server is dropped.
//!
//!   cargo test --test integration

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::{json, Value as Json};

use remora_core::codec;
use remora_core::config::ServerAddress;
use remora_core::{ResultId, Value};
use remora_services::execution;
use remora_services::{CheckpointStore, ClassDef, Engine, ExecError, PoolSettings, Registry};

mod abort;
mod client;
mod commands;
mod results;

// ── Test classes ──────────────────────────────────────────────────────────────

pub const TESTING: &str = "testing";

fn dummy_class() -> ClassDef {
    ClassDef::new("DummyClass")
        .method("a", |_, _| Ok(Value::Int(1)))
        .attribute("b", |_| Ok(Value::from("b")))
        .method("__str__", |_, _| Ok(Value::from("test")))
        .method_returning("annotated_method", "builtins.str", |_, _| {
            Ok(Value::from("annotated"))
        })
        .factory("create", |_| {
            Ok(remora_core::Instance::new("testing.DummyClass").into())
        })
}

fn members(this: &Value) -> Result<&[Value], ExecError> {
    match this {
        Value::Instance(i) => i
            .fields
            .get("members")
            .and_then(Value::as_list)
            .ok_or_else(|| ExecError::Type("members must be a list".into())),
        other => Err(ExecError::Type(format!("not iterable: {}", other.class_name()))),
    }
}

fn dummy_iterable() -> ClassDef {
    ClassDef::new("DummyIterable")
        .fields(&["members"])
        .method("__len__", |this, _| Ok(Value::from(members(this)?.len())))
        .method("__getitem__", |this, args| {
            let items = members(this)?;
            let index = args.int(0, "index")?;
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| ExecError::Index("index out of range".into()))
        })
        .method("__str__", |this, _| {
            Ok(Value::Str(format!("DummyIterable({})", members(this)?.len())))
        })
}

/// Spins until aborted, checkpointing a counter every step.
fn spinner() -> ClassDef {
    ClassDef::new("Spinner").method("spin", |_, _| {
        for count in 1..=3000 {
            if execution::aborted() {
                return Err(ExecError::Aborted);
            }
            execution::save_state(&Value::Int(count))?;
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(Value::from("spun out"))
    })
}

pub fn test_registry() -> Registry {
    let mut registry = Registry::with_builtins();
    registry
        .register(TESTING, dummy_class())
        .register(TESTING, dummy_iterable())
        .register(TESTING, spinner());
    registry
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct TestServer {
    pub addr: SocketAddr,
    pub engine: Engine,
    http: reqwest::Client,
    _checkpoints: tempfile::TempDir,
}

/// Start an engine with `workers` workers behind a real HTTP server.
pub async fn start_server(workers: usize) -> Result<TestServer> {
    let dir = tempfile::tempdir()?;
    let engine = Engine::start(
        test_registry(),
        CheckpointStore::new(dir.path())?,
        PoolSettings {
            workers,
            poll_interval: Duration::from_millis(10),
        },
    );
    let state = remora_api::ApiState::new(engine.clone());
    let addr = remora_api::start(state, "127.0.0.1", 0).await?;
    Ok(TestServer {
        addr,
        engine,
        http: reqwest::Client::new(),
        _checkpoints: dir,
    })
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn server_address(&self) -> ServerAddress {
        ServerAddress {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
        }
    }

    pub async fn post_raw(
        &self,
        path: &str,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let mut req = self.http.post(self.url(path)).body(body);
        if let Some(ct) = content_type {
            req = req.header(CONTENT_TYPE, ct);
        }
        Ok(req.send().await?)
    }

    pub async fn post_json(&self, path: &str, body: &Json) -> Result<reqwest::Response> {
        self.post_raw(path, Some("application/json"), serde_json::to_vec(body)?)
            .await
    }

    /// Submit a command and return its id, failing on any non-200 reply.
    pub async fn submit(&self, body: &Json) -> Result<ResultId> {
        let resp = self.post_json("/", body).await?;
        let status = resp.status();
        let text = resp.text().await?;
        if status != StatusCode::OK {
            bail!("submit returned {}: {}", status, text);
        }
        Ok(ResultId::parse(text.trim())?)
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self.http.get(self.url(path)).send().await?)
    }

    /// Wait for a result and decode it.
    pub async fn fetch(&self, id: &ResultId) -> Result<Value> {
        let resp = self.get(&format!("/object/{}", id)).await?;
        if resp.status() != StatusCode::OK {
            bail!("object returned {}", resp.status());
        }
        let bytes = resp.bytes().await?;
        codec::decode_blob(&bytes).context("undecodable result blob")
    }

    /// Poll `/state` until a checkpoint or result shows up.
    pub async fn wait_for_state(&self, id: &ResultId, attempts: u32) -> Result<Value> {
        for _ in 0..attempts {
            let resp = self.get(&format!("/state/{}", id)).await?;
            if resp.status() == StatusCode::OK {
                return Ok(codec::decode_blob(&resp.bytes().await?)?);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        bail!("no state for {} after {} attempts", id, attempts)
    }
}

// ── Command builders ──────────────────────────────────────────────────────────

pub fn promise(id: &ResultId) -> Json {
    json!({ "__jsonclass__": ["Promise", id.as_str()] })
}

pub fn create(module: &str, class: &str, args: Json) -> Json {
    json!({ "create": { "module": module, "class": class, "args": args } })
}

pub fn call(object: Json, method: &str, args: Json) -> Json {
    json!({ "call": { "object": object, "method": method, "args": args } })
}
