use crate::coordinator::Reply;
use may_minihttp::Response;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        408 => "Request Timeout",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

// may_minihttp only accepts 'static header lines. Reply headers are drawn
// from a small fixed vocabulary (CORS, worker identity), so interning keeps
// the leaked set bounded by distinct lines, not by request count.
static HEADER_LINES: Lazy<Mutex<HashMap<String, &'static str>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn header_line(name: &str, value: &str) -> &'static str {
    let line = format!("{name}: {value}");
    let mut cache = HEADER_LINES.lock().unwrap();
    if let Some(&interned) = cache.get(&line) {
        return interned;
    }
    let interned: &'static str = Box::leak(line.clone().into_boxed_str());
    cache.insert(line, interned);
    interned
}

/// Write a coordinated terminal reply to the connection.
pub fn write_reply(res: &mut Response, reply: Reply) {
    res.status_code(reply.status as usize, status_reason(reply.status));
    res.header("Content-Type: application/json");
    for (name, value) in &reply.headers {
        res.header(header_line(name, value));
    }
    #[allow(clippy::unwrap_used)]
    res.body_vec(serde_json::to_vec(&reply.body).unwrap());
}

pub fn write_json_error(res: &mut Response, status: u16, body: Value) {
    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: application/json");
    res.body_vec(body.to_string().into_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_line_interned_once() {
        let first = header_line("X-Worker-Pid", "4242");
        let second = header_line("X-Worker-Pid", "4242");
        assert!(std::ptr::eq(first, second));
        let other = header_line("X-Worker-Pid", "4243");
        assert!(!std::ptr::eq(first, other));
    }

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(400), "Bad Request");
        assert_eq!(status_reason(408), "Request Timeout");
        assert_eq!(status_reason(418), "OK");
    }
}
