//! Route registration. Each route states its parameter shape explicitly at
//! registration time; the binder reuses that descriptor for every request
//! instead of inspecting anything per call.

use crate::error::AppError;
use crate::response::Reply;
use crate::web::context::RequestContext;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Reconciled arguments passed to a handler.
pub struct HandlerArgs {
    /// Keyword arguments from body/query/path, already reconciled against
    /// the route's binding.
    pub kw: Map<String, Value>,
    /// Present iff the binding declares a request-context parameter.
    pub request: Option<RequestContext>,
}

impl HandlerArgs {
    /// Convenience accessor; missing keys come back as Null.
    pub fn value(&self, key: &str) -> Value {
        self.kw.get(key).cloned().unwrap_or(Value::Null)
    }

    /// String argument or a domain error naming the field.
    pub fn str_arg(&self, key: &str) -> Result<String, AppError> {
        match self.kw.get(key).and_then(Value::as_str) {
            Some(s) => Ok(s.to_string()),
            None => Err(crate::error::ApiError::invalid_value(key, format!("{} must be a string", key)).into()),
        }
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Reply, AppError>> + Send>>;
pub type Handler = Arc<dyn Fn(HandlerArgs) -> HandlerFuture + Send + Sync>;

/// Precomputed classification of a handler's parameters, built once at
/// registration. `required` is always a subset of `named`.
#[derive(Clone, Debug, Default)]
pub struct Binding {
    /// Handler receives the request context.
    pub takes_request: bool,
    /// Handler accepts arbitrary keyword arguments: extraneous keys are kept.
    pub var_kw: bool,
    /// Named keyword parameters the handler declares.
    pub named: Vec<String>,
    /// The subset of `named` with no default; each must be present or the
    /// request is rejected naming the missing one.
    pub required: Vec<String>,
}

impl Binding {
    /// Whether the binder should parse request data at all.
    pub fn wants_kw(&self) -> bool {
        self.var_kw || !self.named.is_empty() || !self.required.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RouteMethod {
    Get,
    Post,
}

impl RouteMethod {
    fn as_str(self) -> &'static str {
        match self {
            RouteMethod::Get => "GET",
            RouteMethod::Post => "POST",
        }
    }
}

pub struct Route {
    pub method: RouteMethod,
    pub pattern: String,
    pub binding: Arc<Binding>,
    pub handler: Handler,
}

/// Append-only registry of (method, path pattern) to bound handlers.
/// Patterns use `{name}` placeholder segments.
#[derive(Default)]
pub struct RouteTable {
    pub(crate) routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable::default()
    }

    pub fn get(&mut self, pattern: &str) -> RouteBuilder<'_> {
        RouteBuilder::new(self, RouteMethod::Get, pattern)
    }

    pub fn post(&mut self, pattern: &str) -> RouteBuilder<'_> {
        RouteBuilder::new(self, RouteMethod::Post, pattern)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Declares one route's parameter shape, then its handler.
pub struct RouteBuilder<'a> {
    table: &'a mut RouteTable,
    method: RouteMethod,
    pattern: String,
    binding: Binding,
}

impl<'a> RouteBuilder<'a> {
    fn new(table: &'a mut RouteTable, method: RouteMethod, pattern: &str) -> Self {
        RouteBuilder {
            table,
            method,
            pattern: pattern.to_string(),
            binding: Binding::default(),
        }
    }

    /// The handler receives the request context.
    pub fn with_request(mut self) -> Self {
        self.binding.takes_request = true;
        self
    }

    /// The handler accepts arbitrary keyword arguments.
    pub fn var_kw(mut self) -> Self {
        self.binding.var_kw = true;
        self
    }

    /// Optional named keyword parameters.
    pub fn params(mut self, names: &[&str]) -> Self {
        for n in names {
            if !self.binding.named.iter().any(|x| x == n) {
                self.binding.named.push((*n).to_string());
            }
        }
        self
    }

    /// Required named keyword parameters (implies named).
    pub fn required(mut self, names: &[&str]) -> Self {
        for n in names {
            if !self.binding.named.iter().any(|x| x == n) {
                self.binding.named.push((*n).to_string());
            }
            if !self.binding.required.iter().any(|x| x == n) {
                self.binding.required.push((*n).to_string());
            }
        }
        self
    }

    /// Finalize the route with its handler.
    pub fn handler<F, Fut>(self, f: F)
    where
        F: Fn(HandlerArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, AppError>> + Send + 'static,
    {
        tracing::info!(
            method = self.method.as_str(),
            pattern = %self.pattern,
            params = ?self.binding.named,
            required = ?self.binding.required,
            "add route"
        );
        let handler: Handler = Arc::new(move |args| Box::pin(f(args)) as HandlerFuture);
        self.table.routes.push(Route {
            method: self.method,
            pattern: self.pattern,
            binding: Arc::new(self.binding),
            handler,
        });
    }
}
