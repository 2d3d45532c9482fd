//! CLI arguments, the YAML config document, and the merged server configuration.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde::Deserialize;
use shadow_rs::formatcp;
use std::collections::BTreeMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const VERSION_BANNER: &str = formatcp!("SimpleHttpServer v{}", build::PKG_VERSION);
pub const DEFAULT_ADDR: &str = ":8080";
/// Body limit used when `maxrequestbodysize` is explicitly `0`.
pub const DEFAULT_MAX_REQUEST_BODY_SIZE: usize = 4 * 1024 * 1024;
pub const BASIC_AUTH_REALM: &str = "Basic realm=Restricted";

/// Command line flags. Every flag overrides the matching config file value.
#[derive(Parser, Debug, Default)]
#[command(
    name = "simple-http-server",
    version = VERSION_INFO,
    about = "Static content HTTP(S) server"
)]
pub struct Args {
    #[arg(long, help = "TCP address to listen, e.g. 0.0.0.0:8080")]
    pub addr: Option<String>,
    #[arg(long, help = "TCP address to listen for TLS requests, unset disables TLS")]
    pub addrtls: Option<String>,
    #[arg(long, help = "Path to TLS certificate file")]
    pub certfile: Option<PathBuf>,
    #[arg(long, help = "Path to TLS key file")]
    pub keyfile: Option<PathBuf>,
    #[arg(
        long,
        value_parser = parse_bool_literal,
        help = "Enable transparent response compression (true/false)"
    )]
    pub compress: Option<bool>,
    #[arg(long, help = "Username for basic authentication")]
    pub username: Option<String>,
    #[arg(long, help = "Password for basic authentication")]
    pub password: Option<String>,
    #[arg(long, help = "Local path to map to webroot, e.g. ./")]
    pub path: Option<String>,
    #[arg(long, help = "Comma separated index file names, e.g. index.html,index.htm")]
    pub indexnames: Option<String>,
    #[arg(short, long, env = "SIMPLE_HTTP_SERVER_CONFIG", help = "YAML config file path")]
    pub config: Option<PathBuf>,
    #[arg(long, value_parser = parse_bool_literal, help = "Print access log (true/false)")]
    pub verbose: Option<bool>,
    #[arg(long, help = "Duplicate log output to this file")]
    pub logfile: Option<PathBuf>,
    #[arg(
        long,
        help = "File served when the requested path is missing, e.g. ./index.html"
    )]
    pub fallback: Option<String>,
    #[arg(
        long,
        value_parser = parse_bool_literal,
        help = "Color access log lines by status code (true/false)"
    )]
    pub enablecolor: Option<bool>,
    #[arg(long, value_parser = parse_bool_literal, help = "Enable POST /upload (true/false)")]
    pub enableupload: Option<bool>,
    #[arg(long, help = "Max request body size for uploads in bytes (0 for 4 MiB)")]
    pub maxrequestbodysize: Option<usize>,
}

/// Parses the literal `true` / `false` (any case) used by the boolean flags.
pub fn parse_bool_literal(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("expected `true` or `false`, got `{value}`")),
    }
}

/// Config file document. Keys match the flag names.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub addr: Option<String>,
    pub addrtls: Option<String>,
    pub certfile: Option<PathBuf>,
    pub keyfile: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub compress: Option<bool>,
    pub paths: BTreeMap<String, String>,
    pub indexnames: Vec<String>,
    pub verbose: Option<bool>,
    pub logfile: Option<PathBuf>,
    pub fallback: Option<String>,
    pub enablecolor: Option<bool>,
    pub enableupload: Option<bool>,
    pub maxrequestbodysize: Option<usize>,
}

/// Reads and parses a YAML config document.
pub fn read_config(path: &Path) -> Result<FileConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    if s.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&s).with_context(|| format!("invalid config {}", path.display()))
}

/// Process-wide configuration, frozen before the listeners start.
#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    pub addr: Option<String>,
    pub addr_tls: Option<String>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub username: String,
    pub password: String,
    /// URI prefix to local root, before normalization.
    pub paths: BTreeMap<String, String>,
    pub index_names: Vec<String>,
    pub compress: bool,
    pub verbose: bool,
    pub enable_color: bool,
    pub enable_upload: bool,
    pub fallback: Option<String>,
    /// `None` leaves upload bodies unbounded.
    pub max_request_body_size: Option<usize>,
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Loads the config file named by `--config` (if any) and applies flags on top.
    pub fn load(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => read_config(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, file))
    }

    /// Flag value if given, else file value, else default.
    pub fn merge(args: &Args, file: FileConfig) -> Self {
        let mut paths = file.paths;
        if let Some(path) = non_empty(&args.path) {
            paths.insert("/".to_string(), path);
        }

        let index_names = match non_empty(&args.indexnames) {
            Some(names) => names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
            None => file.indexnames,
        };

        let mut addr = non_empty(&args.addr).or(file.addr.filter(|v| !v.is_empty()));
        let addr_tls = non_empty(&args.addrtls).or(file.addrtls.filter(|v| !v.is_empty()));
        if addr.is_none() && addr_tls.is_none() {
            addr = Some(DEFAULT_ADDR.to_string());
        }

        Self {
            addr,
            addr_tls,
            cert_file: args.certfile.clone().or(file.certfile),
            key_file: args.keyfile.clone().or(file.keyfile),
            username: non_empty(&args.username)
                .or(file.username)
                .unwrap_or_default(),
            password: non_empty(&args.password)
                .or(file.password)
                .unwrap_or_default(),
            paths,
            index_names,
            compress: args.compress.or(file.compress).unwrap_or(false),
            verbose: args.verbose.or(file.verbose).unwrap_or(true),
            enable_color: args.enablecolor.or(file.enablecolor).unwrap_or(true),
            enable_upload: args.enableupload.or(file.enableupload).unwrap_or(true),
            fallback: non_empty(&args.fallback).or(file.fallback.filter(|v| !v.is_empty())),
            max_request_body_size: args.maxrequestbodysize.or(file.maxrequestbodysize),
            log_file: args.logfile.clone().or(file.logfile),
        }
    }

    /// Basic auth is only required when both halves of the credential are set.
    pub fn basic_auth_enabled(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Effective upload body limit; `None` means unlimited.
    pub fn body_limit(&self) -> Option<usize> {
        match self.max_request_body_size {
            Some(0) => Some(DEFAULT_MAX_REQUEST_BODY_SIZE),
            other => other,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

/// Resolves a listen address. A leading `:` means every interface.
pub fn parse_listen_addr(value: &str) -> Result<SocketAddr> {
    let value = if value.starts_with(':') {
        format!("0.0.0.0{value}")
    } else {
        value.to_string()
    };
    value
        .to_socket_addrs()
        .with_context(|| format!("invalid listen address `{value}`"))?
        .next()
        .ok_or_else(|| anyhow!("listen address `{value}` did not resolve"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bool_literal_accepts_any_case() {
        assert_eq!(parse_bool_literal("TRUE"), Ok(true));
        assert_eq!(parse_bool_literal("false"), Ok(false));
        assert!(parse_bool_literal("yes").is_err());
        assert!(parse_bool_literal("").is_err());
    }

    #[test]
    fn invalid_bool_flag_is_a_usage_error() {
        let result = Args::try_parse_from(["simple-http-server", "--compress", "maybe"]);
        assert!(result.is_err());
        let args = Args::try_parse_from(["simple-http-server", "--verbose", "False"])
            .expect("parse args");
        assert_eq!(args.verbose, Some(false));
    }

    #[test]
    fn flags_override_file_values() {
        let args = Args {
            addr: Some("127.0.0.1:9000".into()),
            path: Some("/srv/www".into()),
            indexnames: Some("index.html, ,index.htm".into()),
            verbose: Some(false),
            ..Default::default()
        };
        let mut paths = BTreeMap::new();
        paths.insert("/".to_string(), "/ignored".to_string());
        paths.insert("/docs".to_string(), "/srv/docs".to_string());
        let file = FileConfig {
            addr: Some("0.0.0.0:1".into()),
            paths,
            indexnames: vec!["default.htm".into()],
            verbose: Some(true),
            compress: Some(true),
            ..Default::default()
        };

        let config = ServerConfig::merge(&args, file);
        assert_eq!(config.addr.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(config.paths["/"], "/srv/www");
        assert_eq!(config.paths["/docs"], "/srv/docs");
        assert_eq!(config.index_names, vec!["index.html", "index.htm"]);
        assert!(!config.verbose);
        assert!(config.compress);
    }

    #[test]
    fn defaults_apply_without_flags_or_file() {
        let config = ServerConfig::merge(&Args::default(), FileConfig::default());
        assert_eq!(config.addr.as_deref(), Some(DEFAULT_ADDR));
        assert!(config.addr_tls.is_none());
        assert!(!config.compress);
        assert!(config.verbose);
        assert!(config.enable_color);
        assert!(config.enable_upload);
        assert!(config.body_limit().is_none());
    }

    #[test]
    fn tls_only_config_does_not_add_plain_listener() {
        let file = FileConfig {
            addrtls: Some(":8443".into()),
            ..Default::default()
        };
        let config = ServerConfig::merge(&Args::default(), file);
        assert!(config.addr.is_none());
        assert_eq!(config.addr_tls.as_deref(), Some(":8443"));
    }

    #[test]
    fn partial_credentials_never_enable_auth() {
        let args = Args {
            username: Some("admin".into()),
            ..Default::default()
        };
        let config = ServerConfig::merge(&args, FileConfig::default());
        assert!(!config.basic_auth_enabled());

        let args = Args {
            username: Some("admin".into()),
            password: Some("s3cret".into()),
            ..Default::default()
        };
        let config = ServerConfig::merge(&args, FileConfig::default());
        assert!(config.basic_auth_enabled());
    }

    #[test]
    fn zero_body_size_means_default_limit() {
        let args = Args {
            maxrequestbodysize: Some(0),
            ..Default::default()
        };
        let config = ServerConfig::merge(&args, FileConfig::default());
        assert_eq!(config.body_limit(), Some(DEFAULT_MAX_REQUEST_BODY_SIZE));
    }

    #[test]
    fn reads_yaml_document() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            "addr: 0.0.0.0:8080\ncompress: false\npaths:\n  /c: /srv/c\nindexnames:\n  - index.html\nverbose: true\nenableupload: false\nHTTP_PROXY: http://proxy:3128\n",
        )
        .expect("write config");

        let file = read_config(&path).expect("read config");
        assert_eq!(file.addr.as_deref(), Some("0.0.0.0:8080"));
        assert_eq!(file.paths["/c"], "/srv/c");
        assert_eq!(file.indexnames, vec!["index.html"]);
        assert_eq!(file.enableupload, Some(false));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "paths: [unterminated").expect("write config");
        assert!(read_config(&path).is_err());
        assert!(read_config(&temp.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn listen_addr_accepts_bare_port() {
        let addr = parse_listen_addr(":8080").expect("parse addr");
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_unspecified());
        assert!(parse_listen_addr("not an address").is_err());
    }
}
