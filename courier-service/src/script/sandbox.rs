//! Restricted script runtime exposing the `pm` API
//!
//! Each execution gets a fresh engine that is discarded afterwards; state
//! lives in a per-execution context shared with the host via `Rc<RefCell>`.
//! The engine has no filesystem, network, or process surface; the only host
//! API is `pm` (plus `console` and JSON helpers), and evaluation is bounded
//! by an operation budget and a wall-clock deadline checked from the
//! progress hook.
//!
//! Scripts are rhai: closures use `||`, so a typical post-response snippet is
//!
//! ```text
//! pm.test("status is 200", || pm.expect(pm.response.code).to.equal(200));
//! ```

use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, NativeCallContext, Position, Scope};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use super::context::{
    AssertionResult, ScriptExecution, ScriptPhase, ScriptRequestView, ScriptResponseView,
};
use crate::config::ScriptConfig;
use crate::vars::{VariableScope, VariableStore};

/// Error token surfaced when the wall-clock deadline terminates a script
pub const SCRIPT_TIMEOUT: &str = "script timeout";

/// Mutable state shared between the host and the `pm` bindings for one
/// execution
struct ScriptState {
    phase: ScriptPhase,
    store: VariableStore,
    request: ScriptRequestView,
    response: Option<ScriptResponseView>,
    assertions: Vec<AssertionResult>,
    console: Vec<String>,
}

type Shared = Rc<RefCell<ScriptState>>;

fn runtime_error(msg: impl Into<String>) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(msg.into().into(), Position::NONE).into()
}

/// Which scope a `pm.variables` / `pm.environment` / `pm.globals` handle
/// operates on
#[derive(Clone, Copy)]
enum VarTarget {
    /// Reads resolve across all scopes; writes land in Local
    Working,
    Environment,
    Global,
}

#[derive(Clone)]
struct PmApi {
    state: Shared,
}

#[derive(Clone)]
struct PmVars {
    state: Shared,
    target: VarTarget,
}

#[derive(Clone)]
struct PmRequest {
    state: Shared,
}

#[derive(Clone)]
struct PmRequestHeaders {
    state: Shared,
}

#[derive(Clone)]
struct PmResponse {
    state: Shared,
}

#[derive(Clone)]
struct PmResponseHeaders {
    state: Shared,
}

#[derive(Clone)]
struct Console {
    state: Shared,
}

#[derive(Clone)]
struct Expectation {
    value: Dynamic,
}

fn dynamic_eq(a: &Dynamic, b: &Dynamic) -> bool {
    if a.is_int() && b.is_int() {
        return a.as_int() == b.as_int();
    }
    if (a.is_int() || a.is_float()) && (b.is_int() || b.is_float()) {
        return as_number(a) == as_number(b);
    }
    if a.is_bool() && b.is_bool() {
        return a.as_bool() == b.as_bool();
    }
    a.to_string() == b.to_string()
}

fn as_number(value: &Dynamic) -> Option<f64> {
    if value.is_int() {
        value.as_int().ok().map(|i| i as f64)
    } else if value.is_float() {
        value.as_float().ok()
    } else {
        None
    }
}

fn require_number(value: &Dynamic, context: &str) -> Result<f64, Box<EvalAltResult>> {
    as_number(value).ok_or_else(|| runtime_error(format!("expected a number for {context}")))
}

impl PmVars {
    fn get(&self, name: &str) -> String {
        let state = self.state.borrow();
        match self.target {
            VarTarget::Working => state
                .store
                .resolve(name)
                .map(|r| r.value.to_string())
                .unwrap_or_default(),
            VarTarget::Environment => state
                .store
                .get(VariableScope::Environment, name)
                .map(|e| e.value.clone())
                .unwrap_or_default(),
            VarTarget::Global => state
                .store
                .get(VariableScope::Global, name)
                .map(|e| e.value.clone())
                .unwrap_or_default(),
        }
    }

    fn set(&self, name: &str, value: Dynamic) {
        let value = value.to_string();
        let mut state = self.state.borrow_mut();
        match self.target {
            VarTarget::Working => state.store.set_local(name, value),
            VarTarget::Environment => {
                state.store.set_scoped(VariableScope::Environment, name, value)
            }
            VarTarget::Global => state.store.set_scoped(VariableScope::Global, name, value),
        }
    }

    fn unset(&self, name: &str) {
        let mut state = self.state.borrow_mut();
        match self.target {
            VarTarget::Working => state.store.unset(VariableScope::Local, name),
            VarTarget::Environment => state.store.unset(VariableScope::Environment, name),
            VarTarget::Global => state.store.unset(VariableScope::Global, name),
        }
    }
}

impl PmRequestHeaders {
    fn mutable(&self) -> Result<(), Box<EvalAltResult>> {
        if self.state.borrow().phase != ScriptPhase::PreRequest {
            return Err(runtime_error(
                "pm.request.headers can only be mutated in pre-request scripts",
            ));
        }
        Ok(())
    }
}

fn register_api(engine: &mut Engine) {
    // pm root
    engine.register_type_with_name::<PmApi>("Pm");
    engine.register_get("variables", |pm: &mut PmApi| PmVars {
        state: pm.state.clone(),
        target: VarTarget::Working,
    });
    engine.register_get("environment", |pm: &mut PmApi| PmVars {
        state: pm.state.clone(),
        target: VarTarget::Environment,
    });
    engine.register_get("globals", |pm: &mut PmApi| PmVars {
        state: pm.state.clone(),
        target: VarTarget::Global,
    });
    engine.register_get("request", |pm: &mut PmApi| PmRequest {
        state: pm.state.clone(),
    });
    engine.register_get(
        "response",
        |pm: &mut PmApi| -> Result<PmResponse, Box<EvalAltResult>> {
            if pm.state.borrow().response.is_none() {
                return Err(runtime_error(
                    "pm.response is only available in post-response scripts",
                ));
            }
            Ok(PmResponse {
                state: pm.state.clone(),
            })
        },
    );
    engine.register_fn("expect", |_pm: &mut PmApi, value: Dynamic| Expectation {
        value,
    });
    engine.register_fn(
        "test",
        |ctx: NativeCallContext,
         pm: &mut PmApi,
         name: &str,
         func: FnPtr|
         -> Result<(), Box<EvalAltResult>> {
            let outcome: Result<Dynamic, Box<EvalAltResult>> =
                func.call_within_context(&ctx, ());
            match outcome {
                Ok(_) => {
                    pm.state.borrow_mut().assertions.push(AssertionResult {
                        name: name.to_string(),
                        passed: true,
                        error: None,
                    });
                    Ok(())
                }
                Err(e) => {
                    // A terminated script (timeout) aborts the whole run of
                    // this snippet; a failed expectation only fails the test.
                    if matches!(*e, EvalAltResult::ErrorTerminated(..)) {
                        return Err(e);
                    }
                    pm.state.borrow_mut().assertions.push(AssertionResult {
                        name: name.to_string(),
                        passed: false,
                        error: Some(e.to_string()),
                    });
                    Ok(())
                }
            }
        },
    );

    // Variable scopes
    engine.register_type_with_name::<PmVars>("PmVars");
    engine.register_fn("get", |vars: &mut PmVars, name: &str| vars.get(name));
    engine.register_fn("set", |vars: &mut PmVars, name: &str, value: Dynamic| {
        vars.set(name, value)
    });
    engine.register_fn("unset", |vars: &mut PmVars, name: &str| vars.unset(name));

    // Request view
    engine.register_type_with_name::<PmRequest>("PmRequest");
    engine.register_get("method", |r: &mut PmRequest| {
        r.state.borrow().request.method.clone()
    });
    engine.register_get("url", |r: &mut PmRequest| {
        r.state.borrow().request.url.clone()
    });
    engine.register_get("body", |r: &mut PmRequest| {
        r.state.borrow().request.body.clone().unwrap_or_default()
    });
    engine.register_get("headers", |r: &mut PmRequest| PmRequestHeaders {
        state: r.state.clone(),
    });

    engine.register_type_with_name::<PmRequestHeaders>("PmRequestHeaders");
    engine.register_fn("get", |h: &mut PmRequestHeaders, key: &str| -> String {
        h.state
            .borrow()
            .request
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    });
    engine.register_fn(
        "add",
        |h: &mut PmRequestHeaders, key: &str, value: &str| -> Result<(), Box<EvalAltResult>> {
            h.mutable()?;
            h.state
                .borrow_mut()
                .request
                .headers
                .push((key.to_string(), value.to_string()));
            Ok(())
        },
    );
    engine.register_fn(
        "remove",
        |h: &mut PmRequestHeaders, key: &str| -> Result<(), Box<EvalAltResult>> {
            h.mutable()?;
            h.state
                .borrow_mut()
                .request
                .headers
                .retain(|(k, _)| !k.eq_ignore_ascii_case(key));
            Ok(())
        },
    );
    engine.register_fn(
        "upsert",
        |h: &mut PmRequestHeaders, key: &str, value: &str| -> Result<(), Box<EvalAltResult>> {
            h.mutable()?;
            let mut state = h.state.borrow_mut();
            let headers = &mut state.request.headers;
            if let Some(pos) = headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(key)) {
                headers[pos].1 = value.to_string();
            } else {
                headers.push((key.to_string(), value.to_string()));
            }
            Ok(())
        },
    );

    // Response view
    engine.register_type_with_name::<PmResponse>("PmResponse");
    engine.register_get("code", |r: &mut PmResponse| -> i64 {
        r.state
            .borrow()
            .response
            .as_ref()
            .map(|resp| resp.code as i64)
            .unwrap_or_default()
    });
    engine.register_get("status", |r: &mut PmResponse| -> String {
        r.state
            .borrow()
            .response
            .as_ref()
            .map(|resp| resp.status.clone())
            .unwrap_or_default()
    });
    engine.register_get("responseTime", |r: &mut PmResponse| -> i64 {
        r.state
            .borrow()
            .response
            .as_ref()
            .map(|resp| resp.response_time_ms as i64)
            .unwrap_or_default()
    });
    engine.register_get("headers", |r: &mut PmResponse| PmResponseHeaders {
        state: r.state.clone(),
    });
    engine.register_fn("text", |r: &mut PmResponse| -> String {
        r.state
            .borrow()
            .response
            .as_ref()
            .map(|resp| resp.body.clone())
            .unwrap_or_default()
    });
    engine.register_fn(
        "json",
        |r: &mut PmResponse| -> Result<Dynamic, Box<EvalAltResult>> {
            let body = r
                .state
                .borrow()
                .response
                .as_ref()
                .map(|resp| resp.body.clone())
                .unwrap_or_default();
            let value: serde_json::Value = serde_json::from_str(&body)
                .map_err(|e| runtime_error(format!("response body is not JSON: {e}")))?;
            rhai::serde::to_dynamic(value)
        },
    );

    engine.register_type_with_name::<PmResponseHeaders>("PmResponseHeaders");
    engine.register_fn("get", |h: &mut PmResponseHeaders, key: &str| -> String {
        h.state
            .borrow()
            .response
            .as_ref()
            .and_then(|resp| {
                resp.headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v.clone())
            })
            .unwrap_or_default()
    });

    // Fluent expectation matcher
    engine.register_type_with_name::<Expectation>("Expectation");
    engine.register_get("to", |e: &mut Expectation| e.clone());
    engine.register_get("be", |e: &mut Expectation| e.clone());
    engine.register_fn(
        "equal",
        |e: &mut Expectation, other: Dynamic| -> Result<bool, Box<EvalAltResult>> {
            if dynamic_eq(&e.value, &other) {
                Ok(true)
            } else {
                Err(runtime_error(format!(
                    "expected {} to equal {}",
                    e.value, other
                )))
            }
        },
    );
    engine.register_fn(
        "include",
        |e: &mut Expectation, other: Dynamic| -> Result<bool, Box<EvalAltResult>> {
            let found = if e.value.is_array() {
                e.value
                    .clone()
                    .into_array()
                    .map(|items| items.iter().any(|item| dynamic_eq(item, &other)))
                    .unwrap_or(false)
            } else {
                e.value.to_string().contains(&other.to_string())
            };
            if found {
                Ok(true)
            } else {
                Err(runtime_error(format!(
                    "expected {} to include {}",
                    e.value, other
                )))
            }
        },
    );
    engine.register_fn(
        "above",
        |e: &mut Expectation, other: Dynamic| -> Result<bool, Box<EvalAltResult>> {
            let left = require_number(&e.value, "pm.expect(...).to.be.above")?;
            let right = require_number(&other, "pm.expect(...).to.be.above")?;
            if left > right {
                Ok(true)
            } else {
                Err(runtime_error(format!(
                    "expected {left} to be above {right}"
                )))
            }
        },
    );
    engine.register_fn(
        "below",
        |e: &mut Expectation, other: Dynamic| -> Result<bool, Box<EvalAltResult>> {
            let left = require_number(&e.value, "pm.expect(...).to.be.below")?;
            let right = require_number(&other, "pm.expect(...).to.be.below")?;
            if left < right {
                Ok(true)
            } else {
                Err(runtime_error(format!(
                    "expected {left} to be below {right}"
                )))
            }
        },
    );
    engine.register_get(
        "ok",
        |e: &mut Expectation| -> Result<bool, Box<EvalAltResult>> {
            let code = require_number(&e.value, "pm.expect(...).to.be.ok")? as i64;
            if (200..=299).contains(&code) {
                Ok(true)
            } else {
                Err(runtime_error(format!(
                    "expected status {code} to be ok (2xx)"
                )))
            }
        },
    );

    // Console
    engine.register_type_with_name::<Console>("Console");
    engine.register_fn("log", |c: &mut Console, message: Dynamic| {
        c.state.borrow_mut().console.push(message.to_string());
    });
    engine.register_fn("log", |c: &mut Console, a: Dynamic, b: Dynamic| {
        c.state.borrow_mut().console.push(format!("{a} {b}"));
    });

    // JSON helpers (the rest of the stdlib subset is rhai's own string,
    // math, and timestamp builtins)
    engine.register_fn(
        "parse_json",
        |text: &str| -> Result<Dynamic, Box<EvalAltResult>> {
            let value: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| runtime_error(format!("invalid JSON: {e}")))?;
            rhai::serde::to_dynamic(value)
        },
    );
    engine.register_fn(
        "to_json",
        |value: Dynamic| -> Result<String, Box<EvalAltResult>> {
            let json: serde_json::Value = rhai::serde::from_dynamic(&value)?;
            Ok(json.to_string())
        },
    );
}

/// Restricted script runtime
///
/// Stateless apart from its limits; cheap to share behind an `Arc`.
pub struct Sandbox {
    config: ScriptConfig,
}

impl Sandbox {
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    fn timeout_for(&self, phase: ScriptPhase) -> Duration {
        let ms = match phase {
            ScriptPhase::PreRequest => self.config.pre_request_timeout_ms,
            ScriptPhase::PostResponse => self.config.post_response_timeout_ms,
        };
        Duration::from_millis(ms)
    }

    /// Run one script to completion on a blocking thread
    ///
    /// Never returns an `Err`: failures (including timeouts) come back in
    /// [`ScriptExecution::error`] so callers can record them on the
    /// iteration instead of aborting the surrounding run.
    pub async fn execute(
        &self,
        phase: ScriptPhase,
        source: String,
        store: VariableStore,
        request: ScriptRequestView,
        response: Option<ScriptResponseView>,
    ) -> ScriptExecution {
        let timeout = self.timeout_for(phase);
        let max_operations = self.config.max_operations;
        let fallback = ScriptExecution {
            store: store.clone(),
            request: request.clone(),
            assertions: vec![],
            console: vec![],
            error: None,
        };

        let result = tokio::task::spawn_blocking(move || {
            run_blocking(phase, &source, store, request, response, timeout, max_operations)
        })
        .await;

        match result {
            Ok(execution) => execution,
            Err(join_error) => {
                tracing::error!("script worker panicked: {join_error}");
                ScriptExecution {
                    error: Some(format!("script worker failed: {join_error}")),
                    ..fallback
                }
            }
        }
    }
}

fn run_blocking(
    phase: ScriptPhase,
    source: &str,
    store: VariableStore,
    request: ScriptRequestView,
    response: Option<ScriptResponseView>,
    timeout: Duration,
    max_operations: u64,
) -> ScriptExecution {
    let state: Shared = Rc::new(RefCell::new(ScriptState {
        phase,
        store,
        request,
        response,
        assertions: vec![],
        console: vec![],
    }));

    let mut engine = Engine::new();
    engine.set_max_operations(max_operations);
    engine.set_max_call_levels(32);
    engine.set_max_expr_depths(64, 32);
    engine.set_max_string_size(1024 * 1024);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(10_000);
    engine.disable_symbol("eval");
    // No module resolution at all: `import` must not reach the filesystem
    engine.set_module_resolver(rhai::module_resolvers::DummyModuleResolver::new());

    let deadline = Instant::now() + timeout;
    engine.on_progress(move |_| {
        if Instant::now() >= deadline {
            Some(SCRIPT_TIMEOUT.into())
        } else {
            None
        }
    });

    register_api(&mut engine);

    let mut scope = Scope::new();
    scope.push_constant(
        "pm",
        PmApi {
            state: state.clone(),
        },
    );
    scope.push_constant(
        "console",
        Console {
            state: state.clone(),
        },
    );

    let error = match engine.run_with_scope(&mut scope, source) {
        Ok(()) => None,
        Err(e) => Some(describe_error(&e, timeout)),
    };

    drop(scope);
    drop(engine);

    let inner = state.borrow();
    ScriptExecution {
        store: inner.store.clone(),
        request: inner.request.clone(),
        assertions: inner.assertions.clone(),
        console: inner.console.clone(),
        error,
    }
}

fn describe_error(error: &EvalAltResult, timeout: Duration) -> String {
    match error {
        EvalAltResult::ErrorTerminated(token, _) if token.to_string() == SCRIPT_TIMEOUT => {
            format!("{SCRIPT_TIMEOUT} after {}ms", timeout.as_millis())
        }
        EvalAltResult::ErrorTooManyOperations(_) => "script operation limit exceeded".to_string(),
        other => other.to_string(),
    }
}
