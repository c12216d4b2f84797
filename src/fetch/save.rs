//! Writes a materialized body to disk.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::debug;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Url;

use crate::error_handling::RequestError;
use crate::fetch::response::ResponseRecord;

static DISPOSITION_FILENAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"filename="([^"]+)""#).ok());

/// Used when neither Content-Disposition nor the URL path names a file.
const FALLBACK_FILENAME: &str = "index";

fn disposition_filename(record: &ResponseRecord) -> Option<String> {
    let header = record.header(CONTENT_DISPOSITION.as_str())?;
    let pattern = DISPOSITION_FILENAME.as_ref()?;
    let name = pattern.captures(header)?.get(1)?.as_str();
    // Only the final component; a server cannot pick the directory.
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

fn url_basename(url: &Url) -> Option<String> {
    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(percent_decode_str(last).decode_utf8_lossy().into_owned())
}

/// File name for a save into a directory: the Content-Disposition
/// `filename="..."`, else the last segment of the request URL path.
pub(crate) fn target_filename(record: &ResponseRecord, request_url: &Url) -> String {
    disposition_filename(record)
        .or_else(|| url_basename(request_url))
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

/// Writes the buffered body to `save_path`.
///
/// An existing directory receives a derived file name; any other path is
/// written as-is after creating its parent directories. Returns the path
/// written.
pub(crate) async fn save_body(
    save_path: &Path,
    record: &ResponseRecord,
    request_url: &Url,
) -> Result<PathBuf, RequestError> {
    let is_dir = tokio::fs::metadata(save_path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);

    let target = if is_dir {
        save_path.join(target_filename(record, request_url))
    } else {
        if let Some(parent) = save_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RequestError::io(parent, e))?;
        }
        save_path.to_path_buf()
    };

    let body = record.buffer.clone().unwrap_or_default();
    tokio::fs::write(&target, &body)
        .await
        .map_err(|e| RequestError::io(&target, e))?;
    debug!("Saved {} bytes to {}", body.len(), target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use reqwest::header::{HeaderMap, HeaderValue};

    use crate::fetch::response::ResponseBody;

    fn record(disposition: Option<&'static str>) -> ResponseRecord {
        let mut headers = HeaderMap::new();
        if let Some(value) = disposition {
            headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static(value));
        }
        ResponseRecord {
            url: "http://example.com/files/report%20v1.pdf".into(),
            status_code: 200,
            status_message: "OK".into(),
            headers,
            raw_headers: Vec::new(),
            body: ResponseBody::Bytes(Bytes::from_static(b"%PDF")),
            text: None,
            buffer: Some(Bytes::from_static(b"%PDF")),
            redirects: Vec::new(),
            content_type: None,
            cached: false,
        }
    }

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_filename_from_content_disposition() {
        let record = record(Some("attachment; filename=\"../../etc/data.csv\""));
        assert_eq!(
            target_filename(&record, &url("http://example.com/download")),
            "data.csv"
        );
    }

    #[test]
    fn test_filename_from_url_path() {
        assert_eq!(
            target_filename(&record(None), &url("http://example.com/files/report%20v1.pdf?x=1")),
            "report v1.pdf"
        );
        assert_eq!(
            target_filename(&record(None), &url("http://example.com/")),
            FALLBACK_FILENAME
        );
    }

    #[tokio::test]
    async fn test_save_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let written = save_body(dir.path(), &record(None), &url("http://example.com/a/b.bin"))
            .await
            .unwrap();
        assert_eq!(written, dir.path().join("b.bin"));
        assert_eq!(std::fs::read(written).unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn test_save_to_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("x").join("y").join("out.pdf");
        let written = save_body(&target, &record(None), &url("http://example.com/a"))
            .await
            .unwrap();
        assert_eq!(written, target);
        assert!(target.exists());
    }
}
