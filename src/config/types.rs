//! Configuration types and CLI options.
//!
//! This module defines the enums and the `clap` parser used by the binary, and
//! the conversion from parsed options into a [`RequestSpec`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde_json::Value;

use crate::config::constants::DEFAULT_TIMEOUT_SECS;
use crate::error_handling::RequestError;
use crate::request::{
    Attachment, Auth, Cookies, InputSource, OutputStream, QuerySource, Redirects, RequestSpec,
    Target, TlsOptions,
};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Command-line options.
///
/// # Examples
///
/// ```bash
/// # Simple GET
/// request_util https://example.com/get
///
/// # JSON POST with a bearer token, two retries
/// request_util https://example.com/post -X post --json '{"a":"abc"}' --bearer t0k --retries 2
///
/// # Multipart upload
/// request_util https://example.com/upload -X post -d a=abc -F xyz=./abc.txt
///
/// # Fan-out with cached responses
/// request_util https://a.example/ https://b.example/ --cache ./.cache --concurrency 2
/// ```
#[derive(Debug, Parser)]
#[command(
    name = "request_util",
    about = "Sends HTTP requests and prints or saves the responses."
)]
pub struct Opt {
    /// Target URL; more than one URL fans out
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "get")]
    pub method: String,

    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Query parameters, encoded ("a=1&b=2") (repeatable)
    #[arg(short, long)]
    pub query: Vec<String>,

    /// Body field as "name=value" (repeatable)
    #[arg(short = 'd', long = "data", value_parser = parse_key_value)]
    pub data: Vec<(String, String)>,

    /// JSON body; sent as application/json unless --content-type is given
    #[arg(long, conflicts_with = "data")]
    pub json: Option<String>,

    /// Multipart file part as "name=path" (repeatable)
    #[arg(short = 'F', long = "attach", value_parser = parse_key_value)]
    pub attachments: Vec<(String, String)>,

    /// Content type, or a file extension such as "json"
    #[arg(long)]
    pub content_type: Option<String>,

    /// Stream the request body from a file
    #[arg(long, conflicts_with_all = ["data", "json", "attachments"])]
    pub input: Option<PathBuf>,

    /// Cookie as "name=value" (repeatable)
    #[arg(short = 'b', long = "cookie")]
    pub cookies: Vec<String>,

    /// Bearer token
    #[arg(long)]
    pub bearer: Option<String>,

    /// Basic credentials as "user:password"
    #[arg(short = 'u', long, conflicts_with = "bearer")]
    pub user: Option<String>,

    /// Maximum redirect hops (0 disables following; default follows up to the internal cap)
    #[arg(long, allow_negative_numbers = true)]
    pub redirects: Option<i64>,

    /// Additional attempts after a transport failure
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Pipe the raw response body into this file
    #[arg(short, long, conflicts_with = "save")]
    pub output: Option<PathBuf>,

    /// Save the response body to a file or into a directory
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Cache directory for successful responses
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Cache freshness in seconds
    #[arg(long, requires = "cache")]
    pub max_cache_time: Option<u64>,

    /// Maximum in-flight requests when several URLs are given
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_seconds: u64,

    /// Return responses with status >= 400 instead of failing
    #[arg(long)]
    pub no_throw: bool,

    /// Buffer binary bodies instead of streaming them
    #[arg(long)]
    pub buffer: bool,

    /// Accept invalid TLS certificates
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// CA certificate (PEM) to trust (repeatable)
    #[arg(long)]
    pub cacert: Vec<PathBuf>,

    /// Print the status line and response headers
    #[arg(short, long)]
    pub include: bool,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected \"Name: value\", got '{raw}'"))
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected \"name=value\", got '{raw}'"))
}

impl Opt {
    /// Builds the request spec described by the options.
    ///
    /// Opens the `--output` file, so this must run inside a Tokio runtime when
    /// that flag is used.
    pub fn to_spec(&self) -> Result<RequestSpec, RequestError> {
        let url = match self.urls.as_slice() {
            [single] => Target::Single(single.clone()),
            many => Target::Many(many.to_vec()),
        };

        let query = (!self.query.is_empty()).then(|| QuerySource::Encoded(self.query.join("&")));

        let mut content_type = self.content_type.clone();
        let data = match &self.json {
            Some(raw) => {
                let value: Value = serde_json::from_str(raw)
                    .map_err(|e| RequestError::config(format!("Invalid parameter: --json ({e})")))?;
                content_type.get_or_insert_with(|| "application/json".to_string());
                Some(value)
            }
            None if !self.data.is_empty() => Some(Value::Object(
                self.data
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            )),
            None => None,
        };

        let auth = match (&self.bearer, &self.user) {
            (Some(token), _) => Some(Auth::Bearer {
                token: token.clone(),
            }),
            (None, Some(user)) => {
                let (username, password) = user.split_once(':').unwrap_or((user.as_str(), ""));
                Some(Auth::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            (None, None) => None,
        };

        let output = match &self.output {
            Some(path) => {
                let file = std::fs::File::create(path).map_err(|e| RequestError::io(path, e))?;
                Some(OutputStream::new(tokio::fs::File::from_std(file)))
            }
            None => None,
        };

        let ca = self
            .cacert
            .iter()
            .map(|path| std::fs::read(path).map_err(|e| RequestError::io(path, e)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RequestSpec {
            url: Some(url),
            method: Some(self.method.clone()),
            headers: self.headers.clone(),
            query,
            content_type,
            data,
            attachments: self
                .attachments
                .iter()
                .map(|(name, path)| (name.clone(), Attachment::path(path)))
                .collect(),
            input: self.input.clone().map(InputSource::Path),
            cookies: (!self.cookies.is_empty()).then(|| Cookies::Header(self.cookies.join("; "))),
            auth,
            redirects: self.redirects.map_or(Redirects::Enabled(true), Redirects::Count),
            buffer: self.buffer,
            output,
            save_path: self.save.clone(),
            cache_path: self.cache.clone(),
            max_cache_time: self.max_cache_time.map(Duration::from_secs),
            retries: self.retries,
            throw_http_error: !self.no_throw,
            tls: TlsOptions {
                ca,
                reject_unauthorized: self.insecure.then_some(false),
                ..Default::default()
            },
            timeout: Some(Duration::from_secs(self.timeout_seconds)),
            concurrency: self.concurrency,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Opt {
        Opt::try_parse_from(std::iter::once("request_util").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_single_url_defaults() {
        let opt = parse(&["http://example.com/"]);
        let spec = opt.to_spec().unwrap();
        assert_eq!(spec.url, Some(Target::Single("http://example.com/".into())));
        assert_eq!(spec.method.as_deref(), Some("get"));
        assert_eq!(spec.redirects, Redirects::Enabled(true));
        assert!(spec.throw_http_error);
        assert_eq!(spec.timeout, Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)));
    }

    #[test]
    fn test_multiple_urls_fan_out() {
        let opt = parse(&["http://a/", "http://b/", "--concurrency", "2"]);
        let spec = opt.to_spec().unwrap();
        assert_eq!(
            spec.url,
            Some(Target::Many(vec!["http://a/".into(), "http://b/".into()]))
        );
        assert_eq!(spec.concurrency, Some(2));
    }

    #[test]
    fn test_form_fields_and_headers() {
        let opt = parse(&[
            "http://example.com/",
            "-X",
            "post",
            "-H",
            "X-Trace: abc",
            "-d",
            "a=abc",
            "-d",
            "b=d=e",
            "-b",
            "s=1",
            "--redirects",
            "0",
        ]);
        let spec = opt.to_spec().unwrap();
        assert_eq!(spec.headers, vec![("X-Trace".to_string(), "abc".to_string())]);
        assert_eq!(spec.data, Some(serde_json::json!({"a": "abc", "b": "d=e"})));
        assert_eq!(spec.cookies, Some(Cookies::Header("s=1".into())));
        assert_eq!(spec.redirects, Redirects::Count(0));
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let opt = parse(&["http://example.com/", "--json", r#"{"a":1}"#]);
        let spec = opt.to_spec().unwrap();
        assert_eq!(spec.content_type.as_deref(), Some("application/json"));
        assert_eq!(spec.data, Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn test_invalid_json_is_configuration_error() {
        let opt = parse(&["http://example.com/", "--json", "{oops"]);
        assert!(matches!(opt.to_spec(), Err(RequestError::Configuration(_))));
    }

    #[test]
    fn test_basic_user_credentials() {
        let opt = parse(&["http://example.com/", "-u", "user:pa:ss"]);
        let spec = opt.to_spec().unwrap();
        assert_eq!(
            spec.auth,
            Some(Auth::Basic {
                username: "user".into(),
                password: "pa:ss".into()
            })
        );
    }

    #[test]
    fn test_conflicting_flags_rejected_by_parser() {
        let result = Opt::try_parse_from([
            "request_util",
            "http://example.com/",
            "--json",
            "{}",
            "-d",
            "a=1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_header_parser() {
        assert_eq!(
            parse_header("Accept: text/html").unwrap(),
            ("Accept".to_string(), "text/html".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
