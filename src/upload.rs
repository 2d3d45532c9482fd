//! Multipart upload into a mapped directory with overwrite or collision-safe naming.

use axum::body::Body as AxumBody;
use axum::extract::{Extension, FromRequest, Multipart};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use chrono::Local;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::access::{AccessLog, client_ip};
use crate::atomic::{AtomicFile, TempPath};
use crate::error::ApiError;
use crate::mounts::MountTable;

/// A file part buffered to the temp directory while the rest of the form is read.
/// The spool file is removed when this is dropped.
struct SpooledFile {
    file_name: String,
    spool: TempPath,
}

#[derive(Default)]
struct UploadForm {
    redirect: Option<String>,
    dir: Option<String>,
    overwrite: bool,
    files: Vec<SpooledFile>,
}

/// `POST /upload`: saves every file part under `p`, then redirects to `r`.
pub async fn upload_files(
    Extension(mounts): Extension<Arc<MountTable>>,
    Extension(access): Extension<Arc<AccessLog>>,
    req: Request<AxumBody>,
) -> Result<Response, ApiError> {
    let ip = client_ip(&req);
    let multipart = Multipart::from_request(req, &())
        .await
        .map_err(|err| ApiError::BadRequest(err.body_text()))?;
    let form = read_form(multipart, &std::env::temp_dir()).await?;

    let Some(redirect) = form.redirect.filter(|r| !r.is_empty()) else {
        return Err(ApiError::BadRequest("missing form field `r`".into()));
    };
    let Some(dir) = form.dir.filter(|p| !p.is_empty()).map(PathBuf::from) else {
        return Err(ApiError::BadRequest("missing form field `p`".into()));
    };
    if mounts.owning_mount(&dir).is_none() {
        return Err(ApiError::BadRequest(
            "upload path is outside the mapped directories".into(),
        ));
    }

    for spooled in &form.files {
        store_file(spooled, &dir, form.overwrite, &access, &ip).await?;
    }

    Ok(Redirect::to(&redirect).into_response())
}

/// Reads every field; file parts go to `spool_dir` so field order does not matter.
async fn read_form(mut multipart: Multipart, spool_dir: &Path) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let spool = spool_field(field, spool_dir).await?;
            form.files.push(SpooledFile { file_name, spool });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        match name.as_str() {
            "r" if form.redirect.is_none() => form.redirect = Some(value),
            "p" if form.dir.is_none() => form.dir = Some(value),
            "o" => form.overwrite = value == "true",
            _ => debug!(field = name, "ignoring upload form field"),
        }
    }
    Ok(form)
}

async fn spool_field(
    mut field: axum::extract::multipart::Field<'_>,
    spool_dir: &Path,
) -> Result<TempPath, ApiError> {
    let spool_path = spool_dir.join(format!("simple-http-server-{}.part", Uuid::new_v4()));
    let mut file = File::create(&spool_path)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let spool = TempPath::new(spool_path);

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|err| ApiError::BadRequest(err.body_text()))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
    }
    file.flush()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(spool)
}

/// Saves one spooled part. Only name exhaustion aborts the request; other
/// failures are logged and the remaining parts continue.
async fn store_file(
    spooled: &SpooledFile,
    dir: &Path,
    overwrite: bool,
    access: &AccessLog,
    ip: &str,
) -> Result<(), ApiError> {
    let Some(file_name) = sanitize_file_name(&spooled.file_name) else {
        warn!(file_name = %spooled.file_name, "rejected upload file name");
        access.record(
            StatusCode::BAD_REQUEST.as_u16(),
            &format!("{ip} | Rejected file name {:?}", spooled.file_name),
        );
        return Ok(());
    };
    let target = dir.join(file_name);

    let saved = if overwrite {
        access.record(0, &format!("{ip} | Saving file {}", target.display()));
        save_overwrite(spooled.spool.path(), &target)
            .await
            .map(|()| target.clone())
    } else {
        match create_unique(&target).await {
            Ok((mut file, path)) => {
                access.record(0, &format!("{ip} | Saving file {}", path.display()));
                // A failed or cancelled copy must not leave a truncated file behind.
                let partial = TempPath::new(path);
                copy_spool(spooled.spool.path(), &mut file)
                    .await
                    .map(|()| partial.keep())
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ApiError::Internal(format!(
                    "Sorry, can not create unique filename for {}",
                    target.display()
                )));
            }
            Err(err) => Err(err),
        }
    };

    match saved {
        Ok(path) => debug!(path = %path.display(), "upload saved"),
        Err(err) => {
            warn!(path = %target.display(), error = %err, "upload save failed");
            access.record(
                StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                &format!("Save {} failed: {err}", target.display()),
            );
        }
    }
    Ok(())
}

async fn save_overwrite(spool_path: &Path, target: &Path) -> io::Result<()> {
    let mut atomic = AtomicFile::new(target).await?;
    copy_spool(spool_path, atomic.file_mut()).await?;
    atomic.finalize().await
}

async fn copy_spool(spool_path: &Path, dest: &mut File) -> io::Result<()> {
    let mut source = File::open(spool_path).await?;
    tokio::io::copy(&mut source, dest).await?;
    dest.flush().await
}

/// Opens `target`, or the first free `stem_<timestamp>_<n>.ext`, with exclusive create.
///
/// `AlreadyExists` is only returned once every index has been tried.
async fn create_unique(target: &Path) -> io::Result<(File, PathBuf)> {
    match create_new(target).await {
        Ok(file) => return Ok((file, target.to_path_buf())),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
        Err(err) => return Err(err),
    }

    let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
    for index in 1..=u64::MAX {
        let candidate = candidate_name(target, &stamp, index);
        match create_new(&candidate).await {
            Ok(file) => return Ok((file, candidate)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "unique file names exhausted",
    ))
}

async fn create_new(path: &Path) -> io::Result<File> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
}

fn candidate_name(target: &Path, stamp: &str, index: u64) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem}_{stamp}_{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{stamp}_{index}"),
    };
    target.with_file_name(name)
}

/// Keeps only the last path segment of a client-supplied file name.
fn sanitize_file_name(raw: &str) -> Option<&str> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}
