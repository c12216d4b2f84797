//! Content negotiation: turns `data`/`attachments` (or an input stream) into a
//! payload plus the content headers that describe it.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use mime_guess::Mime;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde_json::Value;
use tokio_util::io::ReaderStream;

use super::query::{flatten_map, ParamList};
use super::{Attachment, AttachmentSource, InputSource};
use crate::config::{JSON_CONTENT_TYPE, MULTIPART_CONTENT_TYPE, URL_ENCODED_CONTENT_TYPE};
use crate::error_handling::RequestError;

/// Body encoding selected from the content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    /// `application/json`; carries the full header value (parameters included).
    Json(String),
    /// `multipart/form-data`; the boundary is generated per payload.
    Multipart,
    /// `application/x-www-form-urlencoded`; carries the full header value.
    UrlEncoded(String),
    /// Any other `type/subtype`: the caller supplies already-encoded bytes.
    Opaque(String),
}

impl ContentKind {
    /// Selects the encoding from an explicit content type, or defaults to
    /// multipart when attachments are present and url-encoded otherwise.
    ///
    /// A hint without `/` (e.g. `json`) is looked up as a file extension.
    pub fn resolve(content_type: Option<&str>, has_attachments: bool) -> Result<Self, RequestError> {
        let Some(raw) = content_type.map(str::trim).filter(|ct| !ct.is_empty()) else {
            return Ok(if has_attachments {
                ContentKind::Multipart
            } else {
                ContentKind::UrlEncoded(URL_ENCODED_CONTENT_TYPE.to_string())
            });
        };

        let full = resolve_mime_hint(raw)?;
        let mime: Mime = full
            .parse()
            .map_err(|_| RequestError::config(format!("Invalid parameter: contentType '{raw}'")))?;

        Ok(match mime.essence_str() {
            JSON_CONTENT_TYPE => ContentKind::Json(full),
            MULTIPART_CONTENT_TYPE => ContentKind::Multipart,
            URL_ENCODED_CONTENT_TYPE => ContentKind::UrlEncoded(full),
            _ => ContentKind::Opaque(full),
        })
    }
}

/// Expands an extension-style hint (`json`, `.png`) into a full MIME type.
pub(crate) fn resolve_mime_hint(hint: &str) -> Result<String, RequestError> {
    if hint.contains('/') {
        return Ok(hint.to_string());
    }
    mime_guess::from_ext(hint.trim_start_matches('.'))
        .first()
        .map(|mime| mime.essence_str().to_string())
        .ok_or_else(|| RequestError::config(format!("Invalid parameter: contentType '{hint}'")))
}

/// A request body ready to hand to the transport.
pub enum Payload {
    Empty,
    Bytes(Bytes),
    Stream(Body),
    Multipart(Form),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Payload::Stream(_) => f.write_str("Stream"),
            Payload::Multipart(form) => f.debug_tuple("Multipart").field(&form.boundary()).finish(),
        }
    }
}

/// Output of content negotiation.
#[derive(Debug)]
pub struct Negotiated {
    pub payload: Payload,
    /// `Content-Type` and, when statically known, `Content-Length`.
    pub headers: HeaderMap,
}

impl Negotiated {
    pub fn empty() -> Self {
        Self {
            payload: Payload::Empty,
            headers: HeaderMap::new(),
        }
    }

    fn bytes(bytes: Vec<u8>, content_type: &str) -> Result<Self, RequestError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, header_value(content_type)?);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len() as u64));
        Ok(Self {
            payload: Payload::Bytes(Bytes::from(bytes)),
            headers,
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, RequestError> {
    HeaderValue::from_str(value)
        .map_err(|_| RequestError::config(format!("Invalid header value: {value}")))
}

/// Encodes `data` and `attachments` according to `content_type`.
///
/// - JSON: UTF-8 JSON of `data`, with Content-Length.
/// - Multipart: one field part per `data` entry and one file part per
///   attachment. The transport sets Content-Length only when every part has a
///   known length, otherwise the body is sent chunked.
/// - URL-encoded: the serialized `data` (a string is taken as pre-encoded).
/// - Anything else: `data` must already be a string; structured data is a
///   configuration error.
///
/// Live attachment readers are consumed by this call.
pub async fn negotiate(
    content_type: Option<&str>,
    data: Option<&Value>,
    attachments: &mut [(String, Attachment)],
) -> Result<Negotiated, RequestError> {
    let kind = ContentKind::resolve(content_type, !attachments.is_empty())?;

    if !attachments.is_empty() && kind != ContentKind::Multipart {
        return Err(RequestError::config(
            "Conflicting parameters: attachments require multipart/form-data",
        ));
    }

    match kind {
        ContentKind::Json(content_type) => {
            let encoded = serde_json::to_vec(data.unwrap_or(&Value::Null))
                .map_err(|e| RequestError::config(format!("Invalid parameter: data ({e})")))?;
            Negotiated::bytes(encoded, &content_type)
        }
        ContentKind::UrlEncoded(content_type) => {
            let encoded = match data {
                None => String::new(),
                Some(Value::String(pre_encoded)) => pre_encoded.clone(),
                Some(Value::Object(map)) => {
                    let mut params = ParamList::new();
                    params.extend(flatten_map(map));
                    params.encode()
                }
                Some(_) => {
                    return Err(RequestError::config(
                        "Invalid parameter: data must be an object or an encoded string",
                    ))
                }
            };
            Negotiated::bytes(encoded.into_bytes(), &content_type)
        }
        ContentKind::Opaque(content_type) => match data {
            None => Negotiated::bytes(Vec::new(), &content_type),
            Some(Value::String(raw)) => Negotiated::bytes(raw.clone().into_bytes(), &content_type),
            Some(_) => Err(RequestError::config(format!(
                "Invalid parameter: contentType '{content_type}' cannot encode structured data"
            ))),
        },
        ContentKind::Multipart => negotiate_multipart(data, attachments).await,
    }
}

async fn negotiate_multipart(
    data: Option<&Value>,
    attachments: &mut [(String, Attachment)],
) -> Result<Negotiated, RequestError> {
    let mut form = Form::new();

    match data {
        None => {}
        Some(Value::Object(map)) => {
            for (name, value) in flatten_map(map) {
                form = form.text(name, value);
            }
        }
        Some(_) => {
            return Err(RequestError::config(
                "Invalid parameter: multipart data must be an object",
            ))
        }
    }

    for (name, attachment) in attachments.iter_mut() {
        form = form.part(name.clone(), attachment_part(attachment).await?);
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        header_value(&format!("{MULTIPART_CONTENT_TYPE}; boundary={}", form.boundary()))?,
    );

    Ok(Negotiated {
        payload: Payload::Multipart(form),
        headers,
    })
}

async fn attachment_part(attachment: &mut Attachment) -> Result<Part, RequestError> {
    let (part, inferred_name) = match &mut attachment.source {
        AttachmentSource::Path(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| RequestError::io(&path, e))?;
            let length = match attachment.known_length {
                Some(length) => length,
                None => file
                    .metadata()
                    .await
                    .map_err(|e| RequestError::io(&path, e))?
                    .len(),
            };
            let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length);
            (part, file_name(path))
        }
        AttachmentSource::Bytes(bytes) => {
            let length = bytes.len() as u64;
            (Part::stream_with_length(Body::from(bytes.clone()), length), None)
        }
        AttachmentSource::Reader(reader) => {
            let body = Body::wrap_stream(ReaderStream::new(reader.take()?));
            let part = match attachment.known_length {
                Some(length) => Part::stream_with_length(body, length),
                None => Part::stream(body),
            };
            (part, None)
        }
    };

    let filename = attachment.filename.clone().or(inferred_name);
    let content_type = match (&attachment.content_type, &filename) {
        (Some(explicit), _) => resolve_mime_hint(explicit)?,
        (None, Some(name)) => mime_guess::from_path(name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
        (None, None) => mime_guess::mime::APPLICATION_OCTET_STREAM.to_string(),
    };

    let part = match filename {
        Some(name) => part.file_name(name),
        None => part,
    };
    part.mime_str(&content_type)
        .map_err(|_| RequestError::config(format!("Invalid attachment contentType '{content_type}'")))
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

/// Prepares a streamed request body from an input source.
///
/// File sources infer Content-Type from the extension and Content-Length from
/// the file size unless given explicitly. Live readers are consumed.
pub async fn negotiate_input(
    source: &mut InputSource,
    content_type: Option<&str>,
    content_length: Option<u64>,
) -> Result<Negotiated, RequestError> {
    let mut content_type = content_type.map(resolve_mime_hint).transpose()?;
    let mut content_length = content_length;

    let payload = match source {
        InputSource::Path(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| RequestError::io(&path, e))?;
            if content_type.is_none() {
                content_type = mime_guess::from_path(&path)
                    .first()
                    .map(|mime| mime.essence_str().to_string());
            }
            if content_length.is_none() {
                let metadata = file.metadata().await.map_err(|e| RequestError::io(&path, e))?;
                content_length = Some(metadata.len());
            }
            Payload::Stream(Body::wrap_stream(ReaderStream::new(file)))
        }
        InputSource::Bytes(bytes) => {
            content_length.get_or_insert(bytes.len() as u64);
            Payload::Bytes(bytes.clone())
        }
        InputSource::Reader(reader) => {
            Payload::Stream(Body::wrap_stream(ReaderStream::new(reader.take()?)))
        }
    };

    let mut headers = HeaderMap::new();
    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, header_value(&content_type)?);
    }
    if let Some(length) = content_length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(Negotiated { payload, headers })
}
