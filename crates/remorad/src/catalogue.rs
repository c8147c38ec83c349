//! Classes the daemon serves beyond `builtins`.
//!
//! `demo.Countdown(start)` counts down on `run(step_ms)`, checkpointing the
//! remaining count after every step and stopping early when aborted. It is
//! the smallest class that shows `GET /state` and abort working end to end.

use std::time::Duration;

use remora_core::value::class_names;
use remora_core::Value;
use remora_services::execution;
use remora_services::{ClassDef, ExecError, Registry};

pub fn register(registry: &mut Registry) {
    registry.register("demo", countdown());
}

fn start_of(this: &Value) -> Result<i64, ExecError> {
    match this {
        Value::Instance(instance) => instance
            .fields
            .get("start")
            .and_then(Value::as_int)
            .ok_or_else(|| ExecError::Type("start must be int".into())),
        other => Err(ExecError::Type(format!(
            "expected demo.Countdown, got {}",
            other.class_name()
        ))),
    }
}

fn countdown() -> ClassDef {
    ClassDef::new("Countdown")
        .fields(&["start"])
        .method_returning("run", class_names::INT, |this, args| {
            let step_ms = args.get(0, "step_ms").and_then(Value::as_int).unwrap_or(100);
            let step = Duration::from_millis(step_ms.max(0) as u64);
            let mut remaining = start_of(this)?;
            while remaining > 0 {
                if execution::aborted() {
                    return Err(ExecError::Aborted);
                }
                std::thread::sleep(step);
                remaining -= 1;
                execution::save_state(&Value::Int(remaining))?;
            }
            Ok(Value::Int(0))
        })
        .method("__str__", |this, _| {
            Ok(Value::Str(format!("Countdown({})", start_of(this)?)))
        })
}
