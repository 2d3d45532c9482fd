//! TLS certificate loading, with a self-signed fallback.

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use rcgen::generate_simple_self_signed;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

use crate::config::ServerConfig;

/// Builds the rustls config from `certfile`/`keyfile`, or generates a
/// self-signed pair when either is missing.
pub async fn build_rustls_config(config: &ServerConfig, host: IpAddr) -> Result<RustlsConfig> {
    let (cert_path, key_path) = match (&config.cert_file, &config.key_file) {
        (Some(cert), Some(key)) => (cert.clone(), key.clone()),
        _ => generate_self_signed_paths(host, &std::env::temp_dir())?,
    };

    let cert = fs::read(&cert_path)
        .await
        .with_context(|| format!("failed to read certificate {}", cert_path.display()))?;
    let key = fs::read(&key_path)
        .await
        .with_context(|| format!("failed to read private key {}", key_path.display()))?;
    RustlsConfig::from_pem(cert, key)
        .await
        .context("invalid TLS certificate or key")
}

fn generate_self_signed_paths(host: IpAddr, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let mut names = vec!["localhost".to_string()];
    if !host.is_unspecified() {
        names.push(host.to_string());
    }
    let cert = generate_simple_self_signed(names).context("failed to generate certificate")?;
    let cert_path = dir.join("simple-http-server-cert.pem");
    let key_path = dir.join("simple-http-server-key.pem");
    std::fs::write(&cert_path, cert.cert.pem())
        .with_context(|| format!("failed to write {}", cert_path.display()))?;
    std::fs::write(&key_path, cert.key_pair.serialize_pem())
        .with_context(|| format!("failed to write {}", key_path.display()))?;
    warn!(
        "certfile/keyfile not set, using self-signed certificate {}",
        cert_path.display()
    );
    Ok((cert_path, key_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tempfile::tempdir;

    #[test]
    fn self_signed_pair_is_pem() {
        let temp = tempdir().expect("tempdir");
        let (cert, key) =
            generate_self_signed_paths(IpAddr::V4(Ipv4Addr::LOCALHOST), temp.path())
                .expect("generate");
        let cert = std::fs::read_to_string(cert).expect("read cert");
        let key = std::fs::read_to_string(key).expect("read key");
        assert!(cert.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(key.contains("PRIVATE KEY-----"));
    }

    #[tokio::test]
    async fn missing_certificate_file_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let config = ServerConfig {
            cert_file: Some(temp.path().join("missing.pem")),
            key_file: Some(temp.path().join("missing.key")),
            ..Default::default()
        };
        let err = build_rustls_config(&config, IpAddr::V4(Ipv4Addr::LOCALHOST))
            .await
            .expect_err("missing files");
        assert!(err.to_string().contains("failed to read certificate"));
    }
}
