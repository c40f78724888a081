//! Argument binding and dispatch: parses request data, reconciles it with
//! the route's precomputed binding, invokes the handler, and converts domain
//! errors into the normalized payload.

use crate::error::AppError;
use crate::response::TemplateRenderer;
use crate::web::context::RequestContext;
use crate::web::route::{Binding, Handler, HandlerArgs, RouteMethod, RouteTable};
use axum::body::{to_bytes, Body};
use axum::extract::{FromRequestParts, RawPathParams, Request};
use axum::http::{header, request::Parts, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

const MAX_BODY_BYTES: usize = 1024 * 1024;

impl RouteTable {
    /// Compile the registry into an axum router. Template replies become
    /// dispatch faults without a renderer; see `into_router_with`.
    pub fn into_router(self) -> Router {
        self.into_router_with(None)
    }

    pub fn into_router_with(self, renderer: Option<Arc<dyn TemplateRenderer>>) -> Router {
        let mut router = Router::new();
        for route in self.routes {
            let path = axum_path(&route.pattern);
            let binding = route.binding;
            let handler = route.handler;
            let renderer = renderer.clone();
            let call = move |req: Request| {
                let binding = binding.clone();
                let handler = handler.clone();
                let renderer = renderer.clone();
                async move { dispatch(binding, handler, renderer, req).await }
            };
            let method_router = match route.method {
                RouteMethod::Get => axum::routing::get(call),
                RouteMethod::Post => axum::routing::post(call),
            };
            router = router.route(&path, method_router);
        }
        router.layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
    }
}

/// Translate `{name}` placeholder segments to axum's capture syntax.
fn axum_path(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|seg| {
            match seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => format!(":{name}"),
                None => seg.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, message).into_response()
}

/// Parse the raw keyword mapping from a POST body. JSON objects and
/// form-encoded bodies only; anything else is a client error.
fn parse_post_body(parts: &Parts, bytes: &[u8]) -> Result<Map<String, Value>, Response> {
    let Some(ct) = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return Err(bad_request("missing Content-Type".into()));
    };
    let ct = ct.to_ascii_lowercase();
    if ct.starts_with("application/json") {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(m)) => Ok(m),
            Ok(_) => Err(bad_request("JSON body must be an object".into())),
            Err(_) => Err(bad_request("malformed JSON body".into())),
        }
    } else if ct.starts_with("application/x-www-form-urlencoded") {
        match serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes) {
            Ok(pairs) => Ok(first_wins(pairs)),
            Err(_) => Err(bad_request("malformed form body".into())),
        }
    } else {
        Err(bad_request(format!("unsupported Content-Type: {ct}")))
    }
}

/// Flat key/value pairs; the first value wins on repeated keys.
fn first_wins(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut m = Map::new();
    for (k, v) in pairs {
        m.entry(k).or_insert(Value::String(v));
    }
    m
}

async fn dispatch(
    binding: Arc<Binding>,
    handler: Handler,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    req: Request,
) -> Response {
    let (mut parts, body) = req.into_parts();

    let path_params: HashMap<String, String> =
        match RawPathParams::from_request_parts(&mut parts, &()).await {
            Ok(p) => p.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            Err(_) => HashMap::new(),
        };

    let mut kw: Option<Map<String, Value>> = None;
    if binding.wants_kw() {
        if parts.method == Method::POST {
            let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
                Ok(b) => b,
                Err(_) => return bad_request("failed to read request body".into()),
            };
            match parse_post_body(&parts, &bytes) {
                Ok(m) => kw = Some(m),
                Err(resp) => return resp,
            }
        } else if let Some(qs) = parts.uri.query() {
            if !qs.is_empty() {
                match serde_urlencoded::from_str::<Vec<(String, String)>>(qs) {
                    Ok(pairs) => kw = Some(first_wins(pairs)),
                    Err(_) => return bad_request("malformed query string".into()),
                }
            }
        }
    }

    let kw = match kw {
        // no request data: path captures are the keyword mapping
        None => path_params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
        Some(mut m) => {
            if !binding.var_kw && !binding.named.is_empty() {
                m.retain(|k, _| binding.named.iter().any(|n| n == k));
            }
            for (k, v) in &path_params {
                if m.contains_key(k) {
                    tracing::warn!(
                        name = %k,
                        "duplicate arg name in path placeholders and request data; path value wins"
                    );
                }
                m.insert(k.clone(), Value::String(v.clone()));
            }
            m
        }
    };

    for name in &binding.required {
        if !kw.contains_key(name) {
            return bad_request(format!("missing argument: {name}"));
        }
    }

    let request = if binding.takes_request {
        Some(RequestContext {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            path_params,
        })
    } else {
        None
    };

    tracing::debug!(args = ?kw, "call with args");
    match (handler)(HandlerArgs { kw, request }).await {
        Ok(reply) => reply.normalize(renderer.as_deref()),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::response::Reply;
    use serde_json::json;
    use tower::ServiceExt;

    async fn body_string(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn echo_table() -> RouteTable {
        let mut table = RouteTable::new();
        table
            .post("/api/echo")
            .required(&["a", "b"])
            .handler(|args| async move { Ok(Reply::Json(Value::Object(args.kw))) });
        table
    }

    fn json_post(uri: &str, body: Value) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn missing_required_param_names_the_parameter() {
        let app = echo_table().into_router();
        let resp = app.oneshot(json_post("/api/echo", json!({"a": 1}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "missing argument: b");
    }

    #[tokio::test]
    async fn extraneous_keys_are_discarded_without_var_kw() {
        let app = echo_table().into_router();
        let resp = app
            .oneshot(json_post("/api/echo", json!({"a": 1, "b": 2, "c": 3})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body, json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn var_kw_keeps_extraneous_keys() {
        let mut table = RouteTable::new();
        table
            .post("/api/echo")
            .required(&["a"])
            .var_kw()
            .handler(|args| async move { Ok(Reply::Json(Value::Object(args.kw))) });
        let app = table.into_router();
        let resp = app
            .oneshot(json_post("/api/echo", json!({"a": 1, "extra": true})))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body, json!({"a": 1, "extra": true}));
    }

    #[tokio::test]
    async fn path_placeholder_wins_over_query_value() {
        let mut table = RouteTable::new();
        table
            .get("/blog/{id}")
            .params(&["id", "page"])
            .handler(|args| async move { Ok(Reply::Json(Value::Object(args.kw))) });
        let app = table.into_router();
        let req = axum::http::Request::builder()
            .method("GET")
            .uri("/blog/b42?id=spoofed&page=2")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body, json!({"id": "b42", "page": "2"}));
    }

    #[tokio::test]
    async fn path_captures_bind_without_request_data() {
        let mut table = RouteTable::new();
        table
            .get("/blog/{id}")
            .required(&["id"])
            .handler(|args| async move { Ok(Reply::Json(Value::Object(args.kw))) });
        let app = table.into_router();
        let req = axum::http::Request::builder()
            .uri("/blog/b42")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body, json!({"id": "b42"}));
    }

    #[tokio::test]
    async fn form_body_binds_with_first_value_winning() {
        let mut table = RouteTable::new();
        table
            .post("/api/echo")
            .required(&["a"])
            .handler(|args| async move { Ok(Reply::Json(Value::Object(args.kw))) });
        let app = table.into_router();
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/api/echo")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("a=first&a=second"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body, json!({"a": "first"}));
    }

    #[tokio::test]
    async fn unsupported_content_type_is_a_client_error() {
        let app = echo_table().into_router();
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/api/echo")
            .header("content-type", "text/csv")
            .body(Body::from("a,b"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("unsupported Content-Type"));
    }

    #[tokio::test]
    async fn missing_content_type_is_a_client_error() {
        let app = echo_table().into_router();
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/api/echo")
            .body(Body::from("{}"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_object_json_body_is_a_client_error() {
        let app = echo_table().into_router();
        let resp = app.oneshot(json_post("/api/echo", json!([1, 2]))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "JSON body must be an object");
    }

    #[tokio::test]
    async fn domain_error_becomes_the_normalized_payload() {
        let mut table = RouteTable::new();
        table.post("/api/fail").required(&["email"]).handler(|_| async {
            Err(ApiError::invalid_value("email", "invalid email").into())
        });
        let app = table.into_router();
        let resp = app
            .oneshot(json_post("/api/fail", json!({"email": "x"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(
            body,
            json!({"error": "value:invalid", "data": "email", "message": "invalid email"})
        );
    }

    #[tokio::test]
    async fn request_context_is_injected_when_declared() {
        let mut table = RouteTable::new();
        table.get("/whoami").with_request().handler(|args| async move {
            let ctx = args.request.expect("context must be injected");
            Ok(Reply::Text(format!("{} {}", ctx.method, ctx.path())))
        });
        let app = table.into_router();
        let req = axum::http::Request::builder()
            .uri("/whoami")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(body_string(resp).await, "GET /whoami");
    }

    #[tokio::test]
    async fn request_context_is_absent_when_not_declared() {
        let mut table = RouteTable::new();
        table.get("/").handler(|args| async move {
            assert!(args.request.is_none());
            Ok(Reply::Status(204))
        });
        let app = table.into_router();
        let req = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn unmatched_path_is_not_found() {
        let app = echo_table().into_router();
        let req = axum::http::Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn redirect_reply_flows_through_dispatch() {
        let mut table = RouteTable::new();
        table
            .post("/signout")
            .handler(|_| async { Ok(Reply::Text("redirect:/signin".into())) });
        let app = table.into_router();
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/signout")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/signin");
    }

    #[tokio::test]
    async fn status_message_reply_flows_through_dispatch() {
        let mut table = RouteTable::new();
        table
            .get("/gone")
            .handler(|_| async { Ok(Reply::StatusMessage(404, "not found".into())) });
        let app = table.into_router();
        let req = axum::http::Request::builder()
            .uri("/gone")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(resp).await, "not found");
    }

    #[test]
    fn pattern_placeholders_translate_to_axum_captures() {
        assert_eq!(axum_path("/blog/{id}"), "/blog/:id");
        assert_eq!(axum_path("/a/{x}/c/{y}"), "/a/:x/c/:y");
        assert_eq!(axum_path("/plain"), "/plain");
    }
}
