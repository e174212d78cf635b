//! Async method dispatch for JSON-RPC requests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::jsonrpc::{Request, Response, RpcError, JSONRPC_VERSION};

/// The boxed future every method handler returns.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, RpcError>> + Send>>;

type HandlerFn = Arc<dyn Fn(Option<Value>) -> HandlerFuture + Send + Sync>;

/// Routes JSON-RPC methods to registered handler functions.
#[derive(Default)]
pub struct Handler {
    handlers: RwLock<HashMap<String, HandlerFn>>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for a method. Overwrites any existing handler.
    pub fn register<F>(&self, method: &str, handler: F)
    where
        F: Fn(Option<Value>) -> HandlerFuture + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .expect("handler registry poisoned")
            .insert(method.to_string(), Arc::new(handler));
    }

    /// All registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self
            .handlers
            .read()
            .expect("handler registry poisoned")
            .keys()
            .cloned()
            .collect();
        methods.sort();
        methods
    }

    /// Process a single request and produce a response.
    pub async fn handle(&self, request: Request) -> Response {
        let id = request.id.unwrap_or(Value::Null);

        if request.jsonrpc != JSONRPC_VERSION {
            return Response::error(id, RpcError::invalid_request("invalid jsonrpc version"));
        }

        let handler = {
            let handlers = self.handlers.read().expect("handler registry poisoned");
            handlers.get(&request.method).cloned()
        };

        let Some(handler) = handler else {
            return Response::error(id, RpcError::method_not_found(&request.method));
        };

        match handler(request.params).await {
            Ok(result) => Response::ok(id, result),
            Err(error) => Response::error(id, error),
        }
    }

    /// Parse raw bytes as a request, process it, and produce a response.
    /// Malformed JSON yields a parse error with a null id.
    pub async fn handle_raw(&self, raw: &[u8]) -> Response {
        let request: Request = match serde_json::from_slice(raw) {
            Ok(request) => request,
            Err(err) => {
                return Response::error(
                    Value::Null,
                    RpcError::parse_error(format!("parse error: {err}")),
                );
            }
        };
        self.handle(request).await
    }
}

/// Deserialize method params into a typed struct. Missing or `null` params
/// yield the type's default; a structural mismatch is an invalid-params
/// error.
pub fn parse_params<T>(params: Option<Value>) -> Result<T, RpcError>
where
    T: DeserializeOwned + Default,
{
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|err| RpcError::invalid_params(format!("invalid params: {err}"))),
    }
}
