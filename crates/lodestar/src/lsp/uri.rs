//! Filesystem path to `file://` URI conversion.

use std::path::Path;

use lsp_types::Uri;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use super::error::LspError;
use super::Result;

/// Characters escaped in the path component of a file URI.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Convert a filesystem path to an LSP URI.
///
/// The path is canonicalized first, so it must exist. On Unix this produces
/// URIs like `file:///home/user/project/app.py`; on Windows drive letters
/// become `file:///C:/...`. Reserved characters (spaces, `#`, `%`, ...) are
/// percent-encoded.
///
/// # Errors
///
/// Returns [`LspError::InvalidPath`] if the path does not exist, is not valid
/// UTF-8, or does not form a valid URI.
pub fn path_to_uri(path: &Path) -> Result<Uri> {
    let absolute_path = path.canonicalize().map_err(|e| {
        LspError::InvalidPath(format!(
            "cannot canonicalize path '{}': {e}",
            path.display()
        ))
    })?;

    let path_str = absolute_path.to_str().ok_or_else(|| {
        LspError::InvalidPath(format!("path contains invalid UTF-8: {}", path.display()))
    })?;

    #[cfg(windows)]
    let normalized = format!(
        "/{}",
        path_str
            .strip_prefix(r"\\?\")
            .unwrap_or(path_str)
            .replace('\\', "/")
    );

    #[cfg(not(windows))]
    let normalized = path_str;

    let uri_string = format!("file://{}", utf8_percent_encode(&normalized, PATH));

    uri_string
        .parse()
        .map_err(|e| LspError::InvalidPath(format!("invalid URI '{uri_string}': {e}")))
}
