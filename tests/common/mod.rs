#![allow(dead_code)]

pub mod fixtures {
    use eventgate::context::RequestContext;
    use eventgate::coordinator::{Reply, ResponseCoordinator};
    use eventgate::dispatcher::{classify_path, DispatchConfig, RequestDispatcher};
    use eventgate::extensions::ExtensionBus;
    use eventgate::registry::{App, AppRegistry, Member};
    use eventgate::runtime_config::BatchMode;
    use eventgate::validator::KeyValidator;
    use http::Method;
    use serde_json::{Map, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    pub const APP_ID: &str = "0123456789abcdef01234567";
    pub const APP_KEY: &str = "k1";
    pub const ADMIN_KEY: &str = "admin-key";
    pub const VIEWER_KEY: &str = "viewer-key";
    pub const TOKEN_SECRET: &str = "test-secret";

    pub fn registry() -> Arc<RwLock<AppRegistry>> {
        let mut registry = AppRegistry::new();
        registry.insert_app(App {
            id: APP_ID.to_string(),
            key: APP_KEY.to_string(),
            name: "mobile".to_string(),
            country: None,
            timezone: None,
        });
        registry.insert_member(Member {
            id: "m1".to_string(),
            api_key: ADMIN_KEY.to_string(),
            global_admin: true,
            app_access: Vec::new(),
        });
        registry.insert_member(Member {
            id: "m2".to_string(),
            api_key: VIEWER_KEY.to_string(),
            global_admin: false,
            app_access: vec![APP_ID.to_string()],
        });
        Arc::new(RwLock::new(registry))
    }

    pub fn dispatcher(batch_mode: BatchMode) -> Arc<RequestDispatcher> {
        let registry = registry();
        let bus = Arc::new(ExtensionBus::new());
        let validator = Arc::new(KeyValidator::new(Arc::clone(&registry)));
        Arc::new(RequestDispatcher::new(
            bus,
            validator,
            registry,
            DispatchConfig {
                root_path: String::new(),
                batch_mode,
                token_secret: TOKEN_SECRET.to_string(),
                stack_size: 0x8000,
            },
        ))
    }

    /// Build a request context for `path` the way the service would, returning
    /// the coordinator receiver the terminal reply lands on.
    pub fn request(
        method: Method,
        path: &str,
        params: &[(&str, Value)],
    ) -> (RequestContext, may::sync::mpsc::Receiver<Reply>) {
        let (coordinator, rx) = ResponseCoordinator::channel();
        let mut map = Map::new();
        for (k, v) in params {
            map.insert((*k).to_string(), v.clone());
        }
        let (api_path, full_path) = classify_path(path, "");
        (
            RequestContext::new(method, full_path, api_path, map, HashMap::new(), coordinator),
            rx,
        )
    }
}

pub mod http_client {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::time::Duration;

    /// Reserve a free loopback port by binding and immediately dropping.
    pub fn free_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let mut buf = Vec::new();
        loop {
            let mut tmp = [0u8; 1024];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {e:?}"),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn parse_response(resp: &str) -> (u16, serde_json::Value) {
        let mut parts = resp.split("\r\n\r\n");
        let headers = parts.next().unwrap_or("");
        let body = parts.next().unwrap_or("");
        let mut status = 0;
        for line in headers.lines() {
            if line.starts_with("HTTP/1.1") {
                status = line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("0")
                    .parse()
                    .unwrap();
            }
        }
        let json = serde_json::from_str(body).unwrap_or_default();
        (status, json)
    }
}

pub mod test_server {
    use std::sync::Once;

    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }
}
