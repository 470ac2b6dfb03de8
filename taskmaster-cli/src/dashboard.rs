//! Single-threaded HTTP status dashboard: `GET /`, `GET /api/status`, and
//! `GET /api/programs`. Every other path is 404. Broken client
//! connections are swallowed rather than propagated.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use taskmaster_runtime::SupervisionEngine;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>taskmaster</title>
  <style>
    body { font-family: monospace; margin: 2rem; }
    table { border-collapse: collapse; }
    td, th { padding: 0.25rem 1rem; text-align: left; border-bottom: 1px solid #ccc; }
  </style>
</head>
<body>
  <h1>taskmaster</h1>
  <table id="status"><thead>
    <tr><th>name</th><th>state</th><th>pid</th><th>uptime</th><th>retries</th></tr>
  </thead><tbody></tbody></table>
  <script>
    async function refresh() {
      const res = await fetch('/api/status');
      const rows = await res.json();
      const body = document.querySelector('#status tbody');
      body.innerHTML = rows.map(r =>
        `<tr><td>${r.name}</td><td>${r.state}</td><td>${r.pid ?? '-'}</td>` +
        `<td>${r.uptime_secs}s</td><td>${r.retry_count}</td></tr>`
      ).join('');
    }
    refresh();
    setInterval(refresh, 5000);
  </script>
</body>
</html>
"#;

/// Binds `127.0.0.1:<port>` and serves requests one connection at a time
/// for the lifetime of the process.
pub fn serve(engine: Arc<SupervisionEngine>, port: u16) {
    let listener = match TcpListener::bind(("127.0.0.1", port)) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::warn!("dashboard: failed to bind port {port}: {e}");
            return;
        }
    };

    for stream in listener.incoming() {
        let Ok(mut stream) = stream else { continue };
        if let Err(e) = handle_connection(&mut stream, &engine) {
            tracing::warn!("dashboard: connection error: {e}");
        }
    }
}

fn handle_connection(stream: &mut TcpStream, engine: &SupervisionEngine) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let Some((method, target)) = read_request_line(stream)? else {
        return Ok(());
    };

    if method != "GET" {
        return write_response(stream, 405, "text/plain", "method not allowed");
    }

    let path = target.split('?').next().unwrap_or(&target);
    match path {
        "/" => write_response(stream, 200, "text/html; charset=utf-8", INDEX_HTML),
        "/api/status" => {
            let rows = engine.status(None).unwrap_or_default();
            let body = serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string());
            write_response(stream, 200, "application/json", &body)
        }
        "/api/programs" => {
            let body = json!({ "programs": engine.program_names() }).to_string();
            write_response(stream, 200, "application/json", &body)
        }
        _ => write_response(stream, 404, "text/plain", "not found"),
    }
}

/// Reads just the request line (`METHOD TARGET HTTP/1.1`); the dashboard
/// has no routes that need a request body.
fn read_request_line(stream: &mut TcpStream) -> std::io::Result<Option<(String, String)>> {
    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(2).any(|w| w == b"\r\n") || buf.len() >= 8192 {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let Some(line) = text.lines().next() else {
        return Ok(None);
    };
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    if method.is_empty() || target.is_empty() {
        return Ok(None);
    }
    Ok(Some((method, target)))
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &str,
) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes())
}
