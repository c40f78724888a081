//! Handler return contract and its normalization to wire responses.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};

/// Strings returned by handlers starting with this marker redirect to the
/// remainder of the string.
pub const REDIRECT_PREFIX: &str = "redirect:";

/// Key in a JSON reply that delegates rendering to the template collaborator.
pub const TEMPLATE_KEY: &str = "__template__";

/// Rendering collaborator for template replies. Out of this crate's scope;
/// the server wires one in (or doesn't, and template replies become faults).
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, ctx: &Map<String, Value>) -> Result<String, String>;
}

/// Everything a route handler may return. Normalization precedence follows
/// the variant order; any value outside these shapes is unrepresentable.
pub enum Reply {
    /// A complete low-level response, passed through unchanged.
    Raw(Response),
    /// Raw byte payload, served as an octet stream.
    Bytes(Vec<u8>),
    /// `redirect:<target>` becomes a 302; anything else is verbatim HTML.
    Text(String),
    /// A mapping with a `__template__` entry goes to the template renderer;
    /// without one it is serialized as a JSON object response.
    Json(Value),
    /// Bare status in 100..600, empty body.
    Status(u16),
    /// Status plus message body; an out-of-range status stringifies the pair
    /// as plain text instead.
    StatusMessage(u16, String),
}

fn html(body: String) -> Response {
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html;charset=utf-8"),
        )],
        body,
    )
        .into_response()
}

fn plain(body: String) -> Response {
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain;charset=utf-8"),
        )],
        body,
    )
        .into_response()
}

// http::StatusCode accepts 100..1000; the valid range here is 100..600
fn valid_status(s: u16) -> Option<StatusCode> {
    if (100..600).contains(&s) {
        StatusCode::from_u16(s).ok()
    } else {
        None
    }
}

fn dispatch_fault(detail: &str) -> Response {
    tracing::error!(detail, "handler returned an unrepresentable response");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

impl Reply {
    /// Map the handler's return value to a wire response.
    pub fn normalize(self, renderer: Option<&dyn TemplateRenderer>) -> Response {
        match self {
            Reply::Raw(r) => r,
            Reply::Bytes(b) => (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                )],
                b,
            )
                .into_response(),
            Reply::Text(s) => {
                if let Some(target) = s.strip_prefix(REDIRECT_PREFIX) {
                    match HeaderValue::from_str(target) {
                        Ok(loc) => (StatusCode::FOUND, [(header::LOCATION, loc)]).into_response(),
                        Err(_) => dispatch_fault("redirect target is not a valid header value"),
                    }
                } else {
                    html(s)
                }
            }
            Reply::Json(Value::Object(map)) if map.contains_key(TEMPLATE_KEY) => {
                let Some(name) = map.get(TEMPLATE_KEY).and_then(Value::as_str) else {
                    return dispatch_fault("template key is not a string");
                };
                match renderer {
                    Some(r) => match r.render(name, &map) {
                        Ok(body) => html(body),
                        Err(e) => dispatch_fault(&format!("template render failed: {e}")),
                    },
                    None => dispatch_fault("template reply without a renderer"),
                }
            }
            Reply::Json(v) => (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json;charset=utf-8"),
                )],
                v.to_string(),
            )
                .into_response(),
            Reply::Status(s) => match valid_status(s) {
                Some(code) => code.into_response(),
                None => dispatch_fault("status outside the valid HTTP range"),
            },
            Reply::StatusMessage(s, m) => match valid_status(s) {
                Some(code) => (code, plain(m)).into_response(),
                None => plain(format!("({}, {})", s, m)),
            },
        }
    }
}
