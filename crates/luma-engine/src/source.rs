use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use luma_contracts::error::{SUPPORTED_EXTENSIONS, SUPPORTED_MIME_TYPES};
use luma_contracts::VisionError;
use reqwest::Url;

/// Some clients mark attached files as `@path/to/file`.
const ATTACHMENT_MARKER: char = '@';
const DATA_URI_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    LocalPath(PathBuf),
    RemoteUrl(String),
    DataUri(String),
}

impl ImageReference {
    pub fn normalize(raw: &str) -> Self {
        let source = raw.strip_prefix(ATTACHMENT_MARKER).unwrap_or(raw);
        if source.len() != raw.len() {
            log::debug!("stripped attachment marker from image source");
        }

        if is_data_uri(source) {
            return Self::DataUri(source.to_string());
        }
        if is_http_url(source) {
            return Self::RemoteUrl(source.to_string());
        }
        Self::LocalPath(PathBuf::from(source))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocalPath(_) => "local_path",
            Self::RemoteUrl(_) => "remote_url",
            Self::DataUri(_) => "data_uri",
        }
    }

    pub fn validate(&self, max_size_mb: u64) -> Result<(), VisionError> {
        let max_bytes = max_size_mb.saturating_mul(1024 * 1024);
        match self {
            Self::DataUri(uri) => {
                let mime = data_uri_mime(uri);
                if !mime
                    .as_deref()
                    .is_some_and(|value| SUPPORTED_MIME_TYPES.contains(&value))
                {
                    return Err(VisionError::unsupported_mime(mime.as_deref()));
                }
                let size_bytes = estimate_data_uri_bytes(uri);
                if size_bytes > max_bytes {
                    return Err(VisionError::SourceTooLarge {
                        size_bytes,
                        max_mb: max_size_mb,
                    });
                }
                Ok(())
            }
            Self::RemoteUrl(_) => {
                log::debug!("image source is a remote URL, skipping validation");
                Ok(())
            }
            Self::LocalPath(path) => validate_local_file(path, max_size_mb, max_bytes),
        }
    }
}

fn validate_local_file(path: &Path, max_size_mb: u64, max_bytes: u64) -> Result<(), VisionError> {
    let metadata = fs::metadata(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => VisionError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => VisionError::processing(format!("failed to stat {}: {err}", path.display())),
    })?;
    if metadata.len() > max_bytes {
        return Err(VisionError::SourceTooLarge {
            size_bytes: metadata.len(),
            max_mb: max_size_mb,
        });
    }

    let ext = extension_of(path);
    if !ext
        .as_deref()
        .is_some_and(|value| SUPPORTED_EXTENSIONS.contains(&value))
    {
        return Err(VisionError::unsupported_extension(ext.as_deref()));
    }
    Ok(())
}

pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
}

fn is_data_uri(source: &str) -> bool {
    source.starts_with(DATA_URI_PREFIX) && source.contains(BASE64_MARKER)
}

fn is_http_url(source: &str) -> bool {
    Url::parse(source)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// The mime between `data:` and `;base64,`, lowercased. Parameters before the
/// base64 marker are not accepted.
pub(crate) fn data_uri_mime(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix(DATA_URI_PREFIX)?;
    let (mime, _) = rest.split_once(BASE64_MARKER)?;
    if mime.is_empty() || mime.contains(';') {
        return None;
    }
    Some(mime.to_ascii_lowercase())
}

fn data_uri_payload(uri: &str) -> &str {
    uri.split_once(',').map(|(_, payload)| payload).unwrap_or("")
}

fn estimate_data_uri_bytes(uri: &str) -> u64 {
    (data_uri_payload(uri).len() as u64 * 3) / 4
}
