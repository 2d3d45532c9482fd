//! Content-Type selection for file responses.

use axum::http::HeaderValue;
use std::path::Path;

/// Types that must not be left to platform guessing.
const BUILTIN_TYPES: &[(&str, &str)] = &[
    (".css", "text/css; charset=utf-8"),
    (".gif", "image/gif"),
    (".htm", "text/html; charset=utf-8"),
    (".html", "text/html; charset=utf-8"),
    (".jpg", "image/jpeg"),
    (".js", "application/javascript"),
    (".wasm", "application/wasm"),
    (".pdf", "application/pdf"),
    (".png", "image/png"),
    (".svg", "image/svg+xml"),
    (".xml", "text/xml; charset=utf-8"),
];

/// Looks up the fixed table by lowercase extension (with leading dot).
pub fn builtin_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    BUILTIN_TYPES
        .iter()
        .find(|(known, _)| known[1..] == ext)
        .map(|(_, mime)| *mime)
}

/// Content-Type for a file: the fixed table first, then `mime_guess`.
pub fn content_type_for(path: &Path) -> HeaderValue {
    if let Some(mime) = builtin_mime_type(path) {
        return HeaderValue::from_static(mime);
    }
    let guess = mime_guess::from_path(path).first_or_octet_stream();
    HeaderValue::from_str(guess.essence_str())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_known_extensions() {
        assert_eq!(
            builtin_mime_type(Path::new("/srv/www/hello.html")),
            Some("text/html; charset=utf-8")
        );
        assert_eq!(
            builtin_mime_type(Path::new("app.WASM")),
            Some("application/wasm")
        );
        assert_eq!(builtin_mime_type(Path::new("logo.svg")), Some("image/svg+xml"));
        assert_eq!(builtin_mime_type(Path::new("notes.txt")), None);
        assert_eq!(builtin_mime_type(Path::new("Makefile")), None);
    }

    #[test]
    fn unknown_extensions_fall_back_to_guess() {
        assert_eq!(content_type_for(Path::new("notes.txt")), "text/plain");
        assert_eq!(
            content_type_for(Path::new("blob.unknownext")),
            "application/octet-stream"
        );
        assert_eq!(content_type_for(Path::new("site.css")), "text/css; charset=utf-8");
    }
}
