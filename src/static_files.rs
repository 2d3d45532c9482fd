//! GET handling: prefix selection, index files, listings, and the fallback file.

use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::files::{is_file, serve_file};
use crate::listing::{ListingRequest, directory_page, root_index_page};
use crate::mounts::{Mount, MountTable};

/// Resolves a GET request against the mount table and produces the response.
pub async fn serve_static(
    config: &ServerConfig,
    mounts: &MountTable,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let raw_path = uri.path();
    let path = urlencoding::decode(raw_path)
        .map_err(|_| ApiError::BadRequest("invalid path encoding".into()))?;

    if path == "/" && mounts.len() > 1 {
        return Ok(root_index_page(mounts));
    }

    let Some((mount, rest)) = mounts.select(&path) else {
        return Err(ApiError::not_found());
    };
    let local = mount.resolve(rest)?;
    debug!(prefix = mount.prefix(), local = %local.display(), "resolved request path");

    match fs::metadata(&local).await {
        Ok(metadata) if metadata.is_dir() => {
            for name in &config.index_names {
                let index = local.join(name);
                if is_file(&index).await {
                    return serve_file(&index, headers).await;
                }
            }
            let request_uri = uri.path_and_query().map_or(raw_path, |pq| pq.as_str());
            directory_page(ListingRequest {
                path: &path,
                raw_path,
                request_uri,
                local: &local,
                upload_enabled: config.enable_upload,
            })
            .await
        }
        Ok(metadata) if metadata.is_file() => serve_file(&local, headers).await,
        _ => serve_fallback(config, mount, headers).await,
    }
}

/// Serves the configured fallback file from the mount root, or 404.
async fn serve_fallback(
    config: &ServerConfig,
    mount: &Mount,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let Some(fallback) = config.fallback.as_deref() else {
        return Err(ApiError::not_found());
    };
    let target = mount.root().join(Path::new(fallback));
    if is_file(&target).await {
        return serve_file(&target, headers).await;
    }
    Err(ApiError::not_found())
}
