//! Generated HTML pages: directory listings and the multi-root index.

use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Local};
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::fs::Metadata;
use std::path::Path;
use tokio::fs;

use crate::error::ApiError;
use crate::mounts::MountTable;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf8";

const LISTING_STYLE: &str = "table{width:100%;} th,td{text-align:left;padding-right:10px;} \
.size{text-align:right;} a{text-decoration:none} tr:hover{background-color:#ffff99;}";

struct ListingEntry {
    name: String,
    is_dir: bool,
    mode: String,
    size: u64,
    modified: String,
}

/// Where the listing is and how it was requested.
pub struct ListingRequest<'a> {
    /// Percent-decoded request path, used for the title.
    pub path: &'a str,
    /// Request path as sent, used to build links.
    pub raw_path: &'a str,
    /// Full request URI, posted back as the upload redirect target.
    pub request_uri: &'a str,
    /// Local directory being listed.
    pub local: &'a Path,
    pub upload_enabled: bool,
}

/// Renders a directory listing, optionally with the upload form.
pub async fn directory_page(request: ListingRequest<'_>) -> Result<Response, ApiError> {
    let entries = read_entries(request.local)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let decoded = request.path.trim_end_matches('/');
    let link_base = request.raw_path.trim_end_matches('/');
    let title = match &decoded[decoded.rfind('/').map_or(0, |idx| idx + 1)..] {
        "" => "Root",
        segment => segment,
    };
    let parent_link = if link_base.is_empty() {
        String::new()
    } else {
        let parent = match link_base.rfind('/') {
            Some(idx) if idx > 0 => &link_base[..=idx],
            _ => "/",
        };
        format!("<a href=\"{}\"><b>..</b></a>", escape_html(parent))
    };

    let mut html = String::with_capacity(1024 + entries.len() * 160);
    let _ = write!(
        html,
        "<html><head><meta charset=\"utf-8\"><title>{title}</title><style>{LISTING_STYLE}</style></head><body><h1>{title}</h1>",
        title = escape_html(title),
    );
    if request.upload_enabled {
        let _ = write!(
            html,
            "<form enctype=\"multipart/form-data\" action=\"/upload\" method=\"post\">\
<input name=\"files[]\" type=\"file\" multiple>\
<input type=\"submit\" value=\"Upload\" onclick=\"this.disabled=true;this.value='Sending...';this.form.submit();\"/>\
<input type=\"checkbox\" name=\"o\" value=\"true\">Overwrite\
<input type=\"hidden\" id=\"r\" name=\"r\" value=\"{}\">\
<input type=\"hidden\" id=\"p\" name=\"p\" value=\"{}\"></form>",
            escape_html(request.request_uri),
            escape_html(&request.local.to_string_lossy()),
        );
    }
    let _ = write!(
        html,
        "<p>{} item(s)</p><table><tr><th>Name</th><th>Type</th><th>Mode</th><th class=\"size\">Size</th><th>Modified</th></tr><tr><td>{parent_link}</td></tr>",
        entries.len(),
    );

    for entry in &entries {
        let link = format!("{link_base}/{}", urlencoding::encode(&entry.name));
        let name = escape_html(&entry.name);
        if entry.is_dir {
            let _ = write!(
                html,
                "<tr><td><a href=\"{link}\"><b>{name}</b></a></td><td>dir</td><td>{}</td><td class=\"size\"></td><td>{}</td></tr>",
                entry.mode, entry.modified,
            );
        } else {
            let _ = write!(
                html,
                "<tr><td><a href=\"{link}\">{name}</a></td><td>file</td><td>{}</td><td class=\"size\">{}</td><td>{}</td></tr>",
                entry.mode, entry.size, entry.modified,
            );
        }
    }
    html.push_str("</table></body></html>");

    Ok(html_response(html))
}

/// Index of every non-root mount, served for `/` when several prefixes are mapped.
pub fn root_index_page(mounts: &MountTable) -> Response {
    let mut html = String::from("<html><head></head><body><h1>Root</h1><ul>");
    for mount in mounts.by_prefix() {
        if mount.prefix() == "/" {
            continue;
        }
        let _ = write!(
            html,
            "<li><a href=\"{prefix}\">{prefix}</a> -> {root}</li>",
            prefix = escape_html(mount.prefix()),
            root = escape_html(&mount.root().to_string_lossy()),
        );
    }
    html.push_str("</ul></body></html>");
    html_response(html)
}

fn html_response(html: String) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE))],
        html,
    )
        .into_response()
}

async fn read_entries(local: &Path) -> std::io::Result<Vec<ListingEntry>> {
    let mut dir = fs::read_dir(local).await?;
    let mut entries = Vec::new();

    while let Some(entry) = dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        let modified = metadata
            .modified()
            .ok()
            .map(|ts| DateTime::<Local>::from(ts).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        entries.push(ListingEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            is_dir: metadata.is_dir(),
            mode: mode_string(&metadata),
            size: metadata.len(),
            modified,
        });
    }

    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });
    Ok(entries)
}

#[cfg(unix)]
fn mode_string(metadata: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode();
    let mut out = String::with_capacity(10);
    out.push(if metadata.is_dir() { 'd' } else { '-' });
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[cfg(not(unix))]
fn mode_string(metadata: &Metadata) -> String {
    let kind = if metadata.is_dir() { 'd' } else { '-' };
    let write = if metadata.permissions().readonly() { '-' } else { 'w' };
    format!("{kind}r{write}")
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
