//! Per-request context handed to handlers that declare it.

use axum::http::{HeaderMap, Method, Uri};
use std::collections::HashMap;

/// Snapshot of the inbound request, injected when the route's binding
/// declares a request-context parameter. Session/cookie collaborators read
/// from `headers`.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub path_params: HashMap<String, String>,
}

impl RequestContext {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn cookie_header(&self) -> Option<&str> {
        self.headers
            .get(axum::http::header::COOKIE)
            .and_then(|v| v.to_str().ok())
    }
}
