//! Turns a transport response into a [`ResponseRecord`].

use bytes::Bytes;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use tokio::io::AsyncWriteExt;

use super::content_type::{DecodeStrategy, MediaType};
use super::types::{BodyStream, ResponseBody, ResponseRecord};
use crate::error_handling::RequestError;
use crate::request::plan::Delivery;
use crate::request::query::parse_query;
use crate::request::{OutputStream, ResolvedRequestOptions};

/// Builds a record from the status line and headers; the body is left empty.
pub(crate) fn record_head(response: &Response) -> ResponseRecord {
    let status = response.status();
    let headers = response.headers().clone();
    let raw_headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(MediaType::parse);

    ResponseRecord {
        url: response.url().to_string(),
        status_code: status.as_u16(),
        status_message: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        raw_headers,
        body: ResponseBody::Empty,
        text: None,
        buffer: None,
        redirects: Vec::new(),
        content_type,
        cached: false,
    }
}

/// Decodes a buffered body according to its media type.
///
/// Returns the body and, for textual media types, the decoded text. JSON that
/// is not valid in the declared charset, or not valid JSON, is a decode error
/// carrying the raw bytes.
pub(crate) fn decode_body(
    bytes: &Bytes,
    media: Option<&MediaType>,
    status_code: u16,
) -> Result<(ResponseBody, Option<String>), RequestError> {
    let Some(media) = media.filter(|m| m.is_textual()) else {
        return Ok(if bytes.is_empty() {
            (ResponseBody::Empty, None)
        } else {
            (ResponseBody::Bytes(bytes.clone()), None)
        });
    };

    let encoding = media.encoding();
    match media.strategy() {
        DecodeStrategy::Json => {
            let text = encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(|| RequestError::Decode {
                    status_code,
                    message: format!("body is not valid {}", encoding.name()),
                    text: None,
                    buffer: bytes.clone(),
                })?
                .into_owned();
            if text.trim().is_empty() {
                return Ok((ResponseBody::Empty, Some(text)));
            }
            match serde_json::from_str(&text) {
                Ok(value) => Ok((ResponseBody::Json(value), Some(text))),
                Err(e) => Err(RequestError::Decode {
                    status_code,
                    message: e.to_string(),
                    text: Some(text),
                    buffer: bytes.clone(),
                }),
            }
        }
        DecodeStrategy::Form => {
            let (text, _, _) = encoding.decode(bytes);
            let text = text.into_owned();
            Ok((ResponseBody::Form(parse_query(&text)), Some(text)))
        }
        DecodeStrategy::Text | DecodeStrategy::Binary => {
            let (text, _, had_errors) = encoding.decode(bytes);
            if had_errors {
                debug!("Replaced malformed {} sequences in response body", encoding.name());
            }
            let text = text.into_owned();
            Ok((ResponseBody::Text(text.clone()), Some(text)))
        }
    }
}

fn transport(options: &ResolvedRequestOptions, source: reqwest::Error) -> RequestError {
    RequestError::Transport {
        options: Box::new(options.clone()),
        source,
    }
}

fn stream(options: &ResolvedRequestOptions, source: std::io::Error) -> RequestError {
    RequestError::Stream {
        options: Box::new(options.clone()),
        source,
    }
}

async fn copy_body(
    response: &mut Response,
    output: &mut OutputStream,
    options: &ResolvedRequestOptions,
) -> Result<u64, RequestError> {
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(|e| transport(options, e))? {
        output
            .0
            .write_all(&chunk)
            .await
            .map_err(|e| stream(options, e))?;
        written += chunk.len() as u64;
    }
    output.0.flush().await.map_err(|e| stream(options, e))?;
    Ok(written)
}

/// Copies the body into `output`, then closes it. The stream is closed on
/// failure as well; the copy error wins over a failed close.
async fn pipe(
    mut response: Response,
    output: &mut OutputStream,
    options: &ResolvedRequestOptions,
) -> Result<u64, RequestError> {
    let copied = copy_body(&mut response, output, options).await;
    let closed = output.0.shutdown().await;
    let written = copied?;
    closed.map_err(|e| stream(options, e))?;
    Ok(written)
}

/// Materializes the terminal response of a request.
///
/// Piped deliveries write the raw body to the output stream without decoding.
/// In automatic mode only textual bodies are buffered; anything else is handed
/// back as a [`BodyStream`]. Decode errors take precedence over the status
/// check; with `throw_http_error` a status >= 400 becomes
/// [`RequestError::HttpStatus`] carrying the record.
pub(crate) async fn materialize(
    response: Response,
    delivery: &mut Delivery,
    options: &ResolvedRequestOptions,
    throw_http_error: bool,
    redirects: Vec<ResponseRecord>,
) -> Result<ResponseRecord, RequestError> {
    let mut record = record_head(&response);
    record.redirects = redirects;

    let textual = record.content_type.as_ref().is_some_and(MediaType::is_textual);
    match delivery {
        Delivery::Pipe(output) => {
            let written = pipe(response, output, options).await?;
            debug!("Piped {written} bytes from {options}");
        }
        Delivery::Auto if !textual => {
            record.body = ResponseBody::Stream(BodyStream::new(response));
        }
        _ => {
            let bytes = response.bytes().await.map_err(|e| transport(options, e))?;
            let (body, text) = decode_body(&bytes, record.content_type.as_ref(), record.status_code)?;
            record.body = body;
            record.text = text;
            record.buffer = Some(bytes);
        }
    }

    if throw_http_error && record.status_code >= 400 {
        return Err(RequestError::HttpStatus {
            record: Box::new(record),
        });
    }
    Ok(record)
}

/// Drains an intermediate redirect response into a record.
///
/// Bodies that fail to decode are kept as raw bytes.
pub(crate) async fn materialize_hop(
    response: Response,
    options: &ResolvedRequestOptions,
) -> Result<ResponseRecord, RequestError> {
    let mut record = record_head(&response);
    let bytes = response.bytes().await.map_err(|e| transport(options, e))?;
    let (body, text) = decode_body(&bytes, record.content_type.as_ref(), record.status_code)
        .unwrap_or_else(|_| (ResponseBody::Bytes(bytes.clone()), None));
    record.body = body;
    record.text = text;
    record.buffer = Some(bytes);
    Ok(record)
}
