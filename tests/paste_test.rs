use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use localpaste::config::Config;
use localpaste::handlers::AppState;
use localpaste::server::router;
use localpaste::store::FsBlobStore;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "------------------------4f2a9c1e7b3d5a60";

struct TestSetup {
    dir: TempDir,
    app: Router,
}

impl TestSetup {
    fn new() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = FsBlobStore::open(dir.path()).expect("Failed to open store");
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..config
        };
        let state = AppState::new(config, Arc::new(store)).expect("Failed to build state");
        Self {
            dir,
            app: router(state).expect("Failed to build router"),
        }
    }

    fn stored_files(&self) -> Vec<String> {
        std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn post(&self, content_type: &str, body: Vec<u8>) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::HOST, "paste.test")
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn post_multipart(&self, payload: &[u8]) -> Response {
        self.post(
            &format!("multipart/form-data; boundary={}", BOUNDARY),
            multipart_body(payload),
        )
        .await
    }

    async fn get(&self, path: &str) -> Response {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }
}

fn multipart_body(payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"data\"\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

/// Name from a `http://paste.test/<name>\r\n` response
async fn uploaded_name(response: Response) -> String {
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    let url = text.strip_suffix("\r\n").expect("URL ends with CRLF");
    url.strip_prefix("http://paste.test/")
        .expect("URL uses Host header")
        .to_string()
}

#[tokio::test]
async fn multipart_round_trip() {
    let setup = TestSetup::new();
    let payload = b"hello\r\nworld\n\x00\xff binary too".to_vec();

    let name = uploaded_name(setup.post_multipart(&payload).await).await;
    assert!(name.len() >= 4 && name.len() < 20);

    let response = setup.get(&format!("/{}", name)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        payload.len().to_string().as_str()
    );
    assert_eq!(body_bytes(response).await, payload);
}

#[tokio::test]
async fn multipart_payload_containing_boundary_round_trips() {
    let setup = TestSetup::new();
    let payload = format!("a\r\n--{}\r\nContent-Disposition: nope\r\n\r\nb", BOUNDARY).into_bytes();

    let name = uploaded_name(setup.post_multipart(&payload).await).await;
    let response = setup.get(&format!("/{}", name)).await;
    assert_eq!(body_bytes(response).await, payload);
}

#[tokio::test]
async fn urlencoded_round_trip() {
    let setup = TestSetup::new();
    let name = uploaded_name(
        setup
            .post(
                "application/x-www-form-urlencoded",
                b"data=some+text%0Awith%20escapes".to_vec(),
            )
            .await,
    )
    .await;

    let response = setup.get(&format!("/{}", name)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "some text\nwith escapes");
}

#[tokio::test]
async fn large_blob_round_trips_in_chunks() {
    let setup = TestSetup::with_config(Config {
        max_payload_size: 1024 * 1024,
        ..Config::default()
    });
    let payload: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();

    let name = uploaded_name(setup.post_multipart(&payload).await).await;
    let response = setup.get(&format!("/{}", name)).await;
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    assert_eq!(body_bytes(response).await, payload);
}

#[tokio::test]
async fn empty_payload_is_rejected_without_writing() {
    let setup = TestSetup::new();

    let response = setup.post_multipart(b"").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "empty data\r\n");

    let response = setup
        .post("application/x-www-form-urlencoded", b"data=".to_vec())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(setup.stored_files().is_empty());
}

#[tokio::test]
async fn oversize_declared_length_is_rejected() {
    let setup = TestSetup::with_config(Config {
        max_payload_size: 64,
        ..Config::default()
    });

    let response = setup.post_multipart(&[b'x'; 100]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("exceeds maximum upload size"));
    assert!(setup.stored_files().is_empty());
}

#[tokio::test]
async fn missing_content_length_is_rejected() {
    let setup = TestSetup::new();
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("data=abc"))
        .unwrap();

    let response = setup.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsupported_content_type_is_a_server_error() {
    let setup = TestSetup::new();

    let response = setup.post("application/json", b"{\"data\":1}".to_vec()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_text(response).await,
        "Unsupported content type: application/json\r\n"
    );
}

#[tokio::test]
async fn urlencoded_without_data_field_is_rejected() {
    let setup = TestSetup::new();
    let response = setup
        .post("application/x-www-form-urlencoded", b"other=1".to_vec())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_and_empty_blobs_look_the_same() {
    let setup = TestSetup::new();
    std::fs::write(setup.dir.path().join("empty"), b"").unwrap();

    let unknown = setup.get("/neverWritten").await;
    let empty = setup.get("/empty").await;

    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    let unknown_body = body_text(unknown).await;
    assert_eq!(unknown_body, "empty data\r\n");
    assert_eq!(unknown_body, body_text(empty).await);
}

#[tokio::test]
async fn paths_outside_alphabet_are_rejected() {
    let setup = TestSetup::new();

    for path in ["/../etc/passwd", "/abc.def", "/%2e%2e", "/a/b", "/.staging-x", "/%FF", "/ab%FFcd"] {
        let response = setup.get(path).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "path {}", path);
        assert_eq!(body_text(response).await, "invalid file name\r\n", "path {}", path);
    }
}

#[tokio::test]
async fn index_serves_upload_form() {
    let setup = TestSetup::new();

    let response = setup.get("/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    let length: usize = response.headers()[header::CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let html = body_text(response).await;
    assert_eq!(length, html.len());
    assert!(html.contains("<form"));
}

#[tokio::test]
async fn public_host_overrides_host_header() {
    let setup = TestSetup::with_config(Config {
        public_host: Some("files.example.org:8443".to_string()),
        ..Config::default()
    });

    let response = setup.post_multipart(b"content").await;
    assert_eq!(response.status(), StatusCode::OK);
    let url = body_text(response).await;
    assert!(url.starts_with("http://files.example.org:8443/"), "{}", url);
    assert!(url.ends_with("\r\n"));
}

#[tokio::test]
async fn responses_carry_security_headers() {
    let setup = TestSetup::new();
    let name = uploaded_name(setup.post_multipart(b"<script>alert(1)</script>").await).await;

    let response = setup.get(&format!("/{}", name)).await;
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert!(response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
}

#[tokio::test]
async fn rate_limited_responses_carry_security_headers() {
    let setup = TestSetup::with_config(Config {
        rate_limit_per_second: Some(60),
        rate_limit_burst: 1,
        ..Config::default()
    });
    let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)));

    let mut statuses = Vec::new();
    for _ in 0..2 {
        let request = Request::builder()
            .method("GET")
            .uri("/")
            .extension(peer)
            .body(Body::empty())
            .unwrap();
        let response = setup.send(request).await;
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert!(response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
        statuses.push(response.status());
    }
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_get_distinct_names() {
    let setup = Arc::new(TestSetup::new());

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let setup = setup.clone();
            tokio::spawn(async move {
                let payload = format!("upload number {}", i).into_bytes();
                let name = uploaded_name(setup.post_multipart(&payload).await).await;
                (name, payload)
            })
        })
        .collect();

    let mut names = HashSet::new();
    for task in tasks {
        let (name, payload) = task.await.unwrap();
        assert!(names.insert(name.clone()), "duplicate name {}", name);

        let response = setup.get(&format!("/{}", name)).await;
        assert_eq!(body_bytes(response).await, payload);
    }
    assert_eq!(setup.stored_files().len(), 32);
}
