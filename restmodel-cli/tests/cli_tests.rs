use clap::Parser;
use pretty_assertions::assert_eq;
use restmodel_cli::{Args, CliConfig, run};
use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn args(argv: &[&str]) -> Args {
    let mut full = vec!["restmodel"];
    full.extend_from_slice(argv);
    Args::try_parse_from(full).unwrap()
}

fn config_file(contents: serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

// ── Commands ────────────────────────────────────────────────────

#[tokio::test]
async fn get_prints_record_attributes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bikes/1"))
        .and(query_param("expand", "parts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "brand": "Trek"})))
        .expect(1)
        .mount(&server)
        .await;

    let out = run(args(&["-b", &server.uri(), "get", "bikes", "1", "-p", "expand=parts"]))
        .await
        .unwrap();

    assert_eq!(out, json!({"id": 1, "brand": "Trek"}));
}

#[tokio::test]
async fn list_prints_every_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bikes"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
        .mount(&server)
        .await;

    let out = run(args(&["-b", &server.uri(), "list", "bikes", "-p", "page=2"]))
        .await
        .unwrap();

    assert_eq!(out, json!([{"id": 1}, {"id": 2}]));
}

#[tokio::test]
async fn create_posts_the_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bikes"))
        .and(body_json(json!({"brand": "Giant"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 5, "brand": "Giant"})))
        .expect(1)
        .mount(&server)
        .await;

    let out = run(args(&["-b", &server.uri(), "create", "bikes", "-d", r#"{"brand":"Giant"}"#]))
        .await
        .unwrap();

    assert_eq!(out, json!({"id": 5, "brand": "Giant"}));
}

#[tokio::test]
async fn update_with_patch_sends_only_listed_paths() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/bikes/3"))
        .and(body_json(json!({"brand": "Colnago"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let out = run(args(&[
        "-b",
        &server.uri(),
        "update",
        "bikes",
        "3",
        "-d",
        r#"{"brand":"Colnago","color":"red"}"#,
        "--patch",
        "brand",
    ]))
    .await
    .unwrap();

    assert_eq!(out, json!({"brand": "Colnago", "color": "red"}));
}

#[tokio::test]
async fn delete_reports_the_key() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/bikes/a-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let out = run(args(&["-b", &server.uri(), "delete", "bikes", "a-1"]))
        .await
        .unwrap();

    assert_eq!(out, json!({"deleted": "a-1"}));
}

#[tokio::test]
async fn server_errors_fail_the_command() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bikes/9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = run(args(&["-b", &server.uri(), "get", "bikes", "9"]))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn missing_base_url_is_reported() {
    let err = run(args(&["list", "bikes"])).await.unwrap_err();
    assert!(err.to_string().contains("no base URL"));
}

#[tokio::test]
async fn invalid_data_is_reported() {
    let err = run(args(&["-b", "http://127.0.0.1:9", "create", "bikes", "-d", "[1]"]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("JSON object"));
}

// ── Config file ─────────────────────────────────────────────────

#[test]
fn config_file_parses_with_defaults() {
    let file = config_file(json!({
        "api": {"url_prefix": "http://example.test"},
        "resources": {"bikes": {"mask": {"createdAt": "CU"}}},
    }));

    let config = CliConfig::load(file.path()).unwrap();

    assert_eq!(config.api.url_prefix.as_deref(), Some("http://example.test"));
    assert_eq!(config.api.primary_key, "id");
    assert_eq!(config.http.timeout_secs, 30);
    assert_eq!(config.resources["bikes"].mask["createdAt"], "CU");
}

#[test]
fn unreadable_config_is_reported() {
    let err = CliConfig::load(std::path::Path::new("/nonexistent/restmodel.json")).unwrap_err();
    assert!(err.to_string().contains("failed to read config"));
}

#[tokio::test]
async fn config_file_drives_urls_naming_masks_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/bikes"))
        .and(header("authorization", "Bearer t"))
        .and(body_json(json!({"frame_size": 54})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"serial": "X1", "frame_size": 54})))
        .expect(1)
        .mount(&server)
        .await;
    let file = config_file(json!({
        "api": {"url_prefix": server.uri(), "naming": "snake_case", "primary_key": "serial"},
        "http": {"default_headers": {"authorization": "Bearer t"}},
        "resources": {"bikes": {"url": "/v2/bikes", "mask": {"createdAt": "CU"}}},
    }));
    let config_path = file.path().to_str().unwrap().to_string();

    let out = run(args(&[
        "-c",
        &config_path,
        "create",
        "bikes",
        "-d",
        r#"{"frameSize":54,"createdAt":"now"}"#,
    ]))
    .await
    .unwrap();

    assert_eq!(out["serial"], json!("X1"));
    assert_eq!(out["frameSize"], json!(54));
}

#[tokio::test]
async fn invalid_mask_codes_are_reported() {
    let file = config_file(json!({
        "api": {"url_prefix": "http://127.0.0.1:9"},
        "resources": {"bikes": {"mask": {"createdAt": "X"}}},
    }));
    let config_path = file.path().to_str().unwrap().to_string();

    let err = run(args(&["-c", &config_path, "list", "bikes"])).await.unwrap_err();

    assert!(err.to_string().contains("invalid mask for createdAt"));
}
