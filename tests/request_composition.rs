// Tests for how a RequestSpec is turned into the bytes a server receives:
// query merging, headers, cookies, authentication and body encodings.

mod helpers;

use serde_json::{json, Value};

use helpers::{spawn_echo_server, url};
use request_util::{
    fetch_one, Auth, ByteReader, Cookies, InputSource, QuerySource, RequestError, RequestSpec,
    Target,
};

async fn echo(spec: RequestSpec) -> Value {
    let record = fetch_one(spec).await.expect("echo request should succeed");
    assert_eq!(record.status_code, 200);
    record.body.as_json().cloned().expect("echo returns JSON")
}

#[tokio::test]
async fn test_query_merges_with_existing_url_query() {
    let addr = spawn_echo_server().await;
    let echoed = echo(RequestSpec {
        url: Some(Target::from(url(addr, "/get?x=1&a=0"))),
        query: Some([("a", "1"), ("b", "two words")].into_iter().collect()),
        ..Default::default()
    })
    .await;
    assert_eq!(echoed["uri"], "/get?x=1&a=1&b=two+words");
    assert_eq!(echoed["method"], "GET");
}

#[tokio::test]
async fn test_nested_query_map_uses_bracket_notation() {
    let addr = spawn_echo_server().await;
    let map = json!({ "f": { "g": "h" }, "l": ["x", "y"] });
    let echoed = echo(RequestSpec {
        url: Some(Target::from(url(addr, "/q"))),
        query: Some(QuerySource::Map(map.as_object().cloned().unwrap())),
        ..Default::default()
    })
    .await;
    assert_eq!(echoed["uri"], "/q?f%5Bg%5D=h&l%5B0%5D=x&l%5B1%5D=y");
}

#[tokio::test]
async fn test_target_from_host_and_port() {
    let addr = spawn_echo_server().await;
    let echoed = echo(RequestSpec {
        protocol: Some("http:".into()),
        host: Some(addr.ip().to_string()),
        port: Some(addr.port()),
        path: Some("/parts?z=9".into()),
        ..Default::default()
    })
    .await;
    assert_eq!(echoed["uri"], "/parts?z=9");
}

#[tokio::test]
async fn test_cookies_merge_with_cookie_header() {
    let addr = spawn_echo_server().await;
    let echoed = echo(RequestSpec {
        url: Some(Target::from(url(addr, "/cookies"))),
        headers: vec![("Cookie".into(), "a=0; keep=yes".into())],
        cookies: Some(Cookies::Map(vec![
            ("a".into(), Some("1".into())),
            ("dropped".into(), None),
            ("space".into(), Some("x y".into())),
        ])),
        ..Default::default()
    })
    .await;
    assert_eq!(echoed["headers"]["cookie"], "a=1; keep=yes; space=x%20y");
}

#[tokio::test]
async fn test_bearer_token_header() {
    let addr = spawn_echo_server().await;
    let echoed = echo(RequestSpec {
        url: Some(Target::from(url(addr, "/auth"))),
        auth: Some(Auth::Bearer {
            token: "t0ken".into(),
        }),
        ..Default::default()
    })
    .await;
    assert_eq!(echoed["headers"]["authorization"], "Bearer t0ken");
}

#[tokio::test]
async fn test_bearer_token_does_not_override_explicit_authorization() {
    let addr = spawn_echo_server().await;
    let echoed = echo(RequestSpec {
        url: Some(Target::from(url(addr, "/auth"))),
        headers: vec![("Authorization".into(), "Custom abc".into())],
        auth: Some(Auth::Bearer {
            token: "t0ken".into(),
        }),
        ..Default::default()
    })
    .await;
    assert_eq!(echoed["headers"]["authorization"], "Custom abc");
}

#[tokio::test]
async fn test_basic_auth_credentials() {
    let addr = spawn_echo_server().await;
    let echoed = echo(RequestSpec {
        url: Some(Target::from(url(addr, "/auth"))),
        auth: Some(Auth::Basic {
            username: "user".into(),
            password: "pass".into(),
        }),
        ..Default::default()
    })
    .await;
    // base64("user:pass")
    assert_eq!(echoed["headers"]["authorization"], "Basic dXNlcjpwYXNz");
}

#[tokio::test]
async fn test_json_body() {
    let addr = spawn_echo_server().await;
    let echoed = echo(RequestSpec {
        url: Some(Target::from(url(addr, "/post"))),
        method: Some("POST".into()),
        content_type: Some("json".into()),
        data: Some(json!({ "a": "abc", "n": [1, 2] })),
        ..Default::default()
    })
    .await;
    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["headers"]["content-type"], "application/json");
    assert_eq!(echoed["headers"]["content-length"], "21");
    let sent: Value = serde_json::from_str(echoed["body"].as_str().unwrap()).unwrap();
    assert_eq!(sent, json!({ "a": "abc", "n": [1, 2] }));
}

#[tokio::test]
async fn test_urlencoded_body_is_the_default() {
    let addr = spawn_echo_server().await;
    let echoed = echo(RequestSpec {
        url: Some(Target::from(url(addr, "/post"))),
        method: Some("put".into()),
        data: Some(json!({ "a": "abc", "b": "x&y" })),
        ..Default::default()
    })
    .await;
    assert_eq!(echoed["method"], "PUT");
    assert_eq!(
        echoed["headers"]["content-type"],
        "application/x-www-form-urlencoded"
    );
    assert_eq!(echoed["body"], "a=abc&b=x%26y");
}

#[tokio::test]
async fn test_input_stream_body() {
    let addr = spawn_echo_server().await;
    let echoed = echo(RequestSpec {
        url: Some(Target::from(url(addr, "/raw"))),
        method: Some("post".into()),
        content_type: Some("text/plain".into()),
        input: Some(InputSource::Reader(ByteReader::new(&b"streamed body"[..]))),
        ..Default::default()
    })
    .await;
    assert_eq!(echoed["headers"]["content-type"], "text/plain");
    assert_eq!(echoed["body"], "streamed body");
}

#[tokio::test]
async fn test_input_file_body() {
    let addr = spawn_echo_server().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.txt");
    std::fs::write(&path, "from disk").unwrap();

    let echoed = echo(RequestSpec {
        url: Some(Target::from(url(addr, "/raw"))),
        method: Some("post".into()),
        content_type: Some("txt".into()),
        input: Some(InputSource::Path(path)),
        ..Default::default()
    })
    .await;
    assert_eq!(echoed["headers"]["content-type"], "text/plain");
    assert_eq!(echoed["body"], "from disk");
}

#[tokio::test]
async fn test_configuration_errors_before_io() {
    let err = fetch_one(RequestSpec {
        url: Some(Target::from("http://127.0.0.1:9/")),
        method: Some("brew".into()),
        ..Default::default()
    })
    .await
    .unwrap_err();
    assert!(matches!(err, RequestError::Configuration(_)));

    let err = fetch_one(RequestSpec {
        url: Some(Target::from("http://127.0.0.1:9/")),
        data: Some(json!({ "a": 1 })),
        input: Some(InputSource::Bytes("x".into())),
        ..Default::default()
    })
    .await
    .unwrap_err();
    assert!(matches!(err, RequestError::Configuration(_)));

    let err = fetch_one("ftp://example.com/file").await.unwrap_err();
    assert!(matches!(err, RequestError::Configuration(_)));
}
