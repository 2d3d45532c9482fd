//! File responses with byte-range support and cache validators.

use axum::body::Body as AxumBody;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use httpdate::{fmt_http_date, parse_http_date};
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::ApiError;
use crate::etag::{etag_from_metadata, is_not_modified};
use crate::mime::content_type_for;

/// True if `path` exists and is a regular file (symlinks followed).
pub async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

/// Streams a local file, honoring `Range`, `If-Range` and `If-None-Match`.
pub async fn serve_file(target: &Path, request_headers: &HeaderMap) -> Result<Response, ApiError> {
    let metadata = fs::metadata(target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    if !metadata.is_file() {
        return Err(ApiError::not_found());
    }
    let file_size = metadata.len();
    let modified = metadata.modified().ok();
    let etag = etag_from_metadata(&metadata);

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, content_type_for(target));
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(value) = modified.map(fmt_http_date)
        && let Ok(value) = HeaderValue::from_str(&value)
    {
        response_headers.insert(header::LAST_MODIFIED, value);
    }
    if let Ok(value) = HeaderValue::from_str(&etag) {
        response_headers.insert(header::ETAG, value);
    }

    if is_not_modified(request_headers, &etag) {
        response_headers.remove(header::CONTENT_TYPE);
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    let if_range_matches = match request_headers
        .get(header::IF_RANGE)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) if value.trim() == etag => true,
        // Compared at the one-second resolution of HTTP dates.
        Some(value) => match parse_http_date(value) {
            Ok(date) => modified
                .and_then(|ts| parse_http_date(&fmt_http_date(ts)).ok())
                .is_some_and(|ts| ts <= date),
            Err(_) => false,
        },
        None => true,
    };

    let range = if if_range_matches {
        parse_range(request_headers.get(header::RANGE), file_size)?
    } else {
        None
    };

    let file = File::open(target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    if let Some((start, end)) = range {
        let length = end - start + 1;
        debug!(path = %target.display(), start, end, length, "range request accepted");
        let mut file = file;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        let stream = ReaderStream::new(file.take(length));
        insert_header(
            &mut response_headers,
            header::CONTENT_RANGE,
            &format!("bytes {start}-{end}/{file_size}"),
        )?;
        insert_header(&mut response_headers, header::CONTENT_LENGTH, &length.to_string())?;
        return Ok((
            StatusCode::PARTIAL_CONTENT,
            response_headers,
            AxumBody::from_stream(stream),
        )
            .into_response());
    }

    insert_header(
        &mut response_headers,
        header::CONTENT_LENGTH,
        &file_size.to_string(),
    )?;
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

fn insert_header(
    headers: &mut HeaderMap,
    name: header::HeaderName,
    value: &str,
) -> Result<(), ApiError> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| ApiError::Internal("failed to build response header".into()))?;
    headers.insert(name, value);
    Ok(())
}

/// Parses a single `bytes=` range into an inclusive `(start, end)`.
fn parse_range(
    value: Option<&HeaderValue>,
    file_size: u64,
) -> Result<Option<(u64, u64)>, ApiError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let invalid = || ApiError::BadRequest("invalid Range header".into());
    let value = value.to_str().map_err(|_| invalid())?;
    let Some(range) = value.strip_prefix("bytes=") else {
        return Err(invalid());
    };
    if range.contains(',') {
        return Err(ApiError::BadRequest("multiple ranges not supported".into()));
    }
    if file_size == 0 {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }

    let (start_part, end_part) = range.split_once('-').ok_or_else(invalid)?;
    let (start_part, end_part) = (start_part.trim(), end_part.trim());
    let last = file_size - 1;

    let (start, end) = if start_part.is_empty() {
        let suffix: u64 = end_part.parse().map_err(|_| invalid())?;
        if suffix == 0 {
            return Err(ApiError::RangeNotSatisfiable(file_size));
        }
        (file_size.saturating_sub(suffix), last)
    } else {
        let start: u64 = start_part.parse().map_err(|_| invalid())?;
        let end: u64 = if end_part.is_empty() {
            last
        } else {
            end_part.parse::<u64>().map_err(|_| invalid())?.min(last)
        };
        (start, end)
    };

    if start > end || start >= file_size {
        return Err(ApiError::RangeNotSatisfiable(file_size));
    }
    Ok(Some((start, end)))
}
