//! Whole-binary lifecycle test: the supervisor spawns real worker processes,
//! the workers serve HTTP, and SIGTERM tears everything down.

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

mod common;
use common::http_client::{free_addr, parse_response, send_request};

fn spawn_gateway(port: u16, workers: usize) -> Child {
    Command::new(env!("CARGO_BIN_EXE_eventgate"))
        .arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .arg("--workers")
        .arg(workers.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn gateway binary")
}

fn wait_for_ping(port: u16, deadline: Duration) -> Option<serde_json::Value> {
    let addr = format!("127.0.0.1:{port}").parse().unwrap();
    let start = Instant::now();
    while start.elapsed() < deadline {
        if std::net::TcpStream::connect(addr).is_ok() {
            let resp = send_request(
                &addr,
                "GET /o/ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            );
            let (status, body) = parse_response(&resp);
            if status == 200 {
                return Some(body);
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    None
}

fn wait_for_exit(child: &mut Child, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if child.try_wait().unwrap().is_some() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

#[test]
fn test_supervisor_serves_and_terminates_cleanly() {
    let base_port = free_addr().port();
    let mut child = spawn_gateway(base_port, 2);

    // Both worker slots come up on consecutive ports.
    let first = wait_for_ping(base_port, Duration::from_secs(15))
        .expect("worker slot 0 never became ready");
    assert_eq!(first["result"], "pong");
    let second = wait_for_ping(base_port + 1, Duration::from_secs(15))
        .expect("worker slot 1 never became ready");
    assert_eq!(second["result"], "pong");

    unsafe {
        libc::kill(child.id() as i32, libc::SIGTERM);
    }
    assert!(
        wait_for_exit(&mut child, Duration::from_secs(10)),
        "supervisor did not exit on SIGTERM"
    );

    // Workers die with the supervisor; the ports stop answering.
    let addr = format!("127.0.0.1:{base_port}").parse().unwrap();
    let start = Instant::now();
    let mut gone = false;
    while start.elapsed() < Duration::from_secs(5) {
        if std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_err() {
            gone = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    assert!(gone, "worker kept serving after supervisor shutdown");
}
