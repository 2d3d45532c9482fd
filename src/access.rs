//! Access log lines: `<status> | <ip> | <method> | <path>`, colored by status class.

use axum::body::Body as AxumBody;
use axum::extract::{Extension, connect_info::ConnectInfo};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware;
use axum::response::Response;
use chrono::Local;
use nu_ansi_term::Color;
use std::fs::File;
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use crate::auth::Credentials;
use crate::config::ServerConfig;

/// Serialized writer for access lines to stdout and the optional log file.
#[derive(Debug)]
pub struct AccessLog {
    color: bool,
    file: Mutex<Option<File>>,
}

impl AccessLog {
    /// `color` paints stdout lines; `file` receives the same lines uncoloured.
    pub fn new(color: bool, file: Option<File>) -> Self {
        Self {
            color,
            file: Mutex::new(file),
        }
    }

    /// Writes one line. `status` 0 marks informational lines.
    pub fn record(&self, status: u16, line: &str) {
        let line = format!("{} {line}", Local::now().format("%Y/%m/%d %H:%M:%S"));
        // Holding the lock across both writes keeps escape sequences from interleaving.
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut stdout = std::io::stdout().lock();
        if self.color {
            let _ = writeln!(stdout, "{}", status_color(status).paint(line.as_str()));
        } else {
            let _ = writeln!(stdout, "{line}");
        }
        if let Some(file) = file.as_mut() {
            let _ = writeln!(file, "{line}");
        }
    }

    /// Logs a completed request with its final status.
    pub fn request(&self, status: StatusCode, ip: &str, method: &str, path: &str) {
        self.record(
            status.as_u16(),
            &format!("{} | {ip} | {method} | {path}", status.as_u16()),
        );
    }

    /// Logs a rejected request along with the credentials that were supplied.
    pub fn auth_failure(
        &self,
        status: StatusCode,
        ip: &str,
        method: &str,
        path: &str,
        supplied: &Credentials,
    ) {
        self.record(
            status.as_u16(),
            &format!(
                "{} | {ip} | {method} | {path} | {} | {}",
                status.as_u16(),
                supplied.username,
                supplied.password
            ),
        );
    }
}

/// Colour for a status class; anything below 100 is informational.
pub fn status_color(status: u16) -> Color {
    match status {
        500.. => Color::Red,
        400..=499 => Color::Magenta,
        300..=399 => Color::Yellow,
        200..=299 => Color::Green,
        100..=199 => Color::LightCyan,
        _ => Color::Blue,
    }
}

/// Logs every dispatched request with its final status when verbose.
pub async fn log_access(
    Extension(config): Extension<Arc<ServerConfig>>,
    Extension(access): Extension<Arc<AccessLog>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Response {
    if !config.verbose {
        return next.run(req).await;
    }
    let ip = client_ip(&req);
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    access.request(response.status(), &ip, method.as_str(), &path);
    response
}

/// Client address: `x-forwarded-for` first, then the socket peer.
pub fn client_ip<B>(req: &Request<B>) -> String {
    let connect_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    extract_forwarded_ip(req.headers())
        .or(connect_ip)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn extract_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<IpAddr>().ok())
}
