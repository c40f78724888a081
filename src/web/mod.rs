//! Route registry, argument binder, and dispatch into axum.

mod binder;
mod context;
mod route;

pub use context::RequestContext;
pub use route::{Binding, Handler, HandlerArgs, Route, RouteBuilder, RouteMethod, RouteTable};
