// src/api/http/trace.rs
// Trace id extraction and the response-stamping middleware: the caller's
// `x-trace-id` header, trimmed to 120 characters, or a generated one, is
// stashed in request extensions and echoed back on every response (success
// or error alike) so logs from both peers of a call can be correlated.

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

#[derive(Debug, Clone)]
pub struct TraceId(pub String);

pub fn trace_id_for(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.chars().take(120).collect::<String>())
        .unwrap_or_else(|| format!("trace_{}", uuid::Uuid::new_v4().simple()))
}

/// Reads or generates the trace id once per request, makes it available to
/// handlers via `Extension<TraceId>`, and stamps it onto the outgoing
/// response regardless of which branch the handler returned.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = trace_id_for(req.headers());
    req.extensions_mut().insert(TraceId(trace_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = trace_id.parse() {
        response.headers_mut().insert("x-trace-id", value);
    }
    response
}
