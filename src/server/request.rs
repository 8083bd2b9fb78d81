use may_minihttp::Request;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Read;
use tracing::debug;

/// Parsed HTTP request data used by `GateService`.
///
/// Query-string parameters and JSON/form body fields are merged into one
/// string-keyed map, which is how the rest of the pipeline addresses request
/// data regardless of where a field travelled.
#[derive(Debug, PartialEq)]
pub struct ParsedRequest {
    /// HTTP method (GET, POST, ...)
    pub method: String,
    /// Request path without the query string
    pub path: String,
    /// HTTP headers (lowercase keys)
    pub headers: HashMap<String, String>,
    /// Merged query + body fields
    pub params: Map<String, Value>,
}

/// Parse query string parameters from a URL path into the params map.
pub fn parse_query_params(path: &str, params: &mut Map<String, Value>) {
    if let Some(pos) = path.find('?') {
        let query_str = &path[pos + 1..];
        for (k, v) in url::form_urlencoded::parse(query_str.as_bytes()) {
            params.insert(k.to_string(), Value::String(v.to_string()));
        }
    }
}

fn merge_body(body_str: &str, content_type: &str, params: &mut Map<String, Value>) {
    if content_type.starts_with("application/x-www-form-urlencoded") {
        for (k, v) in url::form_urlencoded::parse(body_str.as_bytes()) {
            params.insert(k.to_string(), Value::String(v.to_string()));
        }
        return;
    }
    // Default: treat the body as JSON; only object bodies contribute fields.
    match serde_json::from_str::<Value>(body_str) {
        Ok(Value::Object(fields)) => {
            for (k, v) in fields {
                params.insert(k, v);
            }
        }
        Ok(_) | Err(_) => {
            debug!(
                content_type = %content_type,
                body_len = body_str.len(),
                "request body is not a JSON object, ignoring"
            );
        }
    }
}

/// Extract method, path, headers and merged parameters from a raw request.
pub fn parse_request(req: Request) -> ParsedRequest {
    let method = req.method().to_string();
    let raw_path = req.path().to_string();
    let path = raw_path.split('?').next().unwrap_or("/").to_string();

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let mut params = Map::new();
    parse_query_params(&raw_path, &mut params);

    let mut body_str = String::new();
    if let Ok(size) = req.body().read_to_string(&mut body_str) {
        if size > 0 {
            let content_type = headers
                .get("content-type")
                .map(|s| s.as_str())
                .unwrap_or("");
            merge_body(&body_str, content_type, &mut params);
        }
    }

    debug!(
        method = %method,
        path = %path,
        param_count = params.len(),
        header_count = headers.len(),
        "HTTP request parsed"
    );

    ParsedRequest {
        method,
        path,
        headers,
        params,
    }
}
