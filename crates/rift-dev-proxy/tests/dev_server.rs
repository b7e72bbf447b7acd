//! End-to-end tests against in-process dev servers.
//!
//! Each test binds `127.0.0.1:0`, serves on a background task and talks to the
//! server with `reqwest`.

use async_trait::async_trait;
use rift_dev_proxy::sync::{
    InterfaceDef, RemoteApi, RemoteId, RepositoryGraph, RepositoryModule, SyncError,
};
use rift_dev_proxy::{Config, DevServer};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn(server: DevServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.run_on(listener));
    addr
}

fn config_for(dir: &Path, yaml: &str) -> Config {
    let mut config: Config = if yaml.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(yaml).unwrap()
    };
    config.mock.dir = dir.to_path_buf();
    config.mock.watch = false;
    config
}

fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

/// Poll `url` until it answers with `status`, or give up after [`WAIT`].
async fn wait_for_status(client: &reqwest::Client, url: &str, status: u16) -> reqwest::Response {
    let deadline = Instant::now() + WAIT;
    loop {
        let resp = client.get(url).send().await.unwrap();
        if resp.status().as_u16() == status || Instant::now() > deadline {
            return resp;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_static_mock_and_no_route() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "api.json", r#"{"GET /ping": {"ok": true}}"#);
    let addr = spawn(DevServer::new(config_for(dir.path(), "")).unwrap()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(resp.headers()["x-rift-mock"], "local");
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"ok": true}));

    let resp = client
        .get(format!("http://{addr}/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"error": "No route"})
    );
}

#[tokio::test]
async fn test_responder_sees_params_query_and_body() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "users.rhai",
        r#"
            mock("GET /users/:id", |request| #{ id: request.params.id, q: request.query.q });
            mock("POST /users", |request| reply(201, request.body, #{ "x-created": "yes" }));
            mock("GET /later", |request| ());
        "#,
    );
    let addr = spawn(DevServer::new(config_for(dir.path(), "")).unwrap()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/users/7?q=hi"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"id": "7", "q": "hi"})
    );

    let resp = client
        .post(format!("http://{addr}/users"))
        .json(&json!({"name": "ada"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert_eq!(resp.headers()["x-created"], "yes");
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"name": "ada"}));

    // Unit result hands the request on; nothing else claims it.
    let resp = client
        .get(format!("http://{addr}/later"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_invalid_json_body_is_rejected() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "echo.rhai",
        r#"mock("POST /echo", |request| request.body);"#,
    );
    let addr = spawn(DevServer::new(config_for(dir.path(), "")).unwrap()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/echo"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_unparsed_media_type_reaches_responder() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "upload.rhai",
        r#"mock("POST /upload", |request| #{ body: request.body, ok: true });"#,
    );
    let addr = spawn(DevServer::new(config_for(dir.path(), "")).unwrap()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/upload"))
        .header("content-type", "multipart/form-data; boundary=xyz")
        .body("--xyz\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nv\r\n--xyz--\r\n")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"body": {}, "ok": true})
    );
}

#[tokio::test]
async fn test_preflight_for_mocked_path() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "api.json", r#"{"POST /login": {"token": "t"}}"#);
    let addr = spawn(DevServer::new(config_for(dir.path(), "")).unwrap()).await;

    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/login"))
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(resp.headers()["access-control-allow-methods"], "POST");
    assert_eq!(resp.headers()["access-control-allow-headers"], "content-type");
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_proxy_rewrites_path_and_marks_response() {
    let upstream_dir = TempDir::new().unwrap();
    write(
        upstream_dir.path(),
        "upstream.json",
        r#"{"GET /v1/items": {"from": "upstream"}}"#,
    );
    let upstream = spawn(DevServer::new(config_for(upstream_dir.path(), "")).unwrap()).await;

    let dir = TempDir::new().unwrap();
    write(dir.path(), "local.json", r#"{"GET /api/local": {"from": "local"}}"#);
    let yaml = format!(
        r#"
proxy:
  - context: /api
    target: http://{upstream}
    path_rewrite:
      "^/api": "/v1"
"#
    );
    let addr = spawn(DevServer::new(config_for(dir.path(), &yaml)).unwrap()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/items"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-rift-proxied"], "true");
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"from": "upstream"})
    );

    // A local mock takes precedence over a matching proxy context.
    let resp = client
        .get(format!("http://{addr}/api/local"))
        .send()
        .await
        .unwrap();
    assert!(resp.headers().get("x-rift-proxied").is_none());
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"from": "local"}));
}

#[tokio::test]
async fn test_unreachable_proxy_target_is_bad_gateway() {
    let dir = TempDir::new().unwrap();
    let yaml = r#"
proxy:
  - context: /api
    target: http://127.0.0.1:9
"#;
    let addr = spawn(DevServer::new(config_for(dir.path(), yaml)).unwrap()).await;

    let resp = reqwest::Client::new()
        .get(format!("http://{addr}/api/x"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
}

struct FakeApi;

#[async_trait]
impl RemoteApi for FakeApi {
    async fn fetch_token(&self) -> Result<String, SyncError> {
        Ok("token".to_string())
    }

    async fn fetch_repository(
        &self,
        id: &RemoteId,
        _token: &str,
    ) -> Result<RepositoryGraph, SyncError> {
        Ok(RepositoryGraph {
            id: id.clone(),
            name: "demo".to_string(),
            modules: vec![RepositoryModule {
                interfaces: vec![
                    InterfaceDef {
                        id: RemoteId::Num(1),
                        method: "GET".to_string(),
                        url: "/api/orders/:id".to_string(),
                        updated_at: json!("2021-05-01T00:00:00.000Z"),
                    },
                    InterfaceDef {
                        id: RemoteId::Num(2),
                        method: "GET".to_string(),
                        url: "/api/status".to_string(),
                        updated_at: json!("2021-05-01T00:00:00.000Z"),
                    },
                ],
            }],
            collaborators: Vec::new(),
        })
    }

    async fn fetch_payload(&self, interface_id: &RemoteId) -> Result<Value, SyncError> {
        Ok(json!({"remote": interface_id.to_string()}))
    }
}

#[tokio::test]
async fn test_remote_routes_served_after_sync() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "local.json", r#"{"GET /api/status": {"remote": false}}"#);
    let yaml = r#"
remote:
  url: http://rap.invalid
  id: 42
  app_id: app
  app_secret: secret
"#;
    let server = DevServer::new_with_remote_api(config_for(dir.path(), yaml), Arc::new(FakeApi))
        .unwrap();
    let addr = spawn(server).await;
    let client = reqwest::Client::new();

    let resp = wait_for_status(&client, &format!("http://{addr}/api/orders/5"), 200).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-rift-mock"], "remote");
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"remote": "1"}));

    // Local mocks win over synced routes.
    let resp = client
        .get(format!("http://{addr}/api/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({"remote": false}));
}

#[tokio::test]
async fn test_mock_file_change_is_picked_up() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "api.json", r#"{"GET /v": {"n": 1}}"#);
    let mut config = config_for(dir.path(), "");
    config.mock.watch = true;
    let addr = spawn(DevServer::new(config).unwrap()).await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/v");

    assert_eq!(
        client.get(&url).send().await.unwrap().json::<Value>().await.unwrap(),
        json!({"n": 1})
    );

    // Give the watcher time to register before writing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    write(dir.path(), "api.json", r#"{"GET /v": {"n": 2}}"#);

    let deadline = Instant::now() + WAIT;
    let mut body = Value::Null;
    while Instant::now() < deadline {
        body = client.get(&url).send().await.unwrap().json().await.unwrap();
        if body == json!({"n": 2}) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(body, json!({"n": 2}));
}
