//! Integration tests: fan-out of one public key across publish targets

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use keywarden_core::{KeySpec, PublishTarget, TlsConfig};
use keywarden_crypto::{KeyGenerator, KeyPair, StandardKeyGenerator};
use keywarden_publish::{
    PublishError, PublishManager, Publisher, PublisherConfig, TYPE_FILESYSTEM, TYPE_HTTP,
};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Received {
    requests: Arc<Mutex<Vec<(HeaderMap, Bytes)>>>,
}

async fn accept(State(received): State<Received>, headers: HeaderMap, body: Bytes) -> StatusCode {
    received.requests.lock().unwrap().push((headers, body));
    StatusCode::CREATED
}

async fn reject() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

/// Local key-distribution endpoint; returns its base URL.
async fn spawn_endpoint(received: Received) -> String {
    let app = Router::new()
        .route("/keys", post(accept))
        .route("/down", post(reject))
        .with_state(received);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn plain_http_target(url: &str) -> PublishTarget {
    let mut target = PublishTarget::new(TYPE_HTTP).with_config("endpoint", url);
    target.tls = Some(TlsConfig {
        ca_bundle_pem: None,
        insecure_skip_verify: true,
    });
    target
}

fn keypair() -> KeyPair {
    StandardKeyGenerator::new().generate(&KeySpec::ec("P-256")).unwrap()
}

#[tokio::test]
async fn test_http_publish_posts_pem_with_key_id() {
    let received = Received::default();
    let base = spawn_endpoint(received.clone()).await;
    let kp = keypair();

    let manager = PublishManager::with_defaults(&PublisherConfig::default()).unwrap();
    manager
        .publish_all(&[plain_http_target(&format!("{}/keys", base))], &kp)
        .await
        .unwrap();

    let requests = received.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (headers, body) = &requests[0];
    assert_eq!(headers["content-type"], "application/x-pem-file");
    assert_eq!(headers["x-key-id"], kp.key_id());
    let pem = std::str::from_utf8(body).unwrap();
    assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    assert!(!pem.contains("PRIVATE"));
}

#[tokio::test]
async fn test_http_error_status_is_reported() {
    let base = spawn_endpoint(Received::default()).await;
    let manager = PublishManager::with_defaults(&PublisherConfig::default()).unwrap();

    let errs = manager
        .publish_all(&[plain_http_target(&format!("{}/down", base))], &keypair())
        .await
        .unwrap_err();

    match &errs.failures[0].error {
        PublishError::Status { status, .. } => assert_eq!(status.as_u16(), 503),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_plain_http_refused_without_opt_in() {
    let received = Received::default();
    let base = spawn_endpoint(received.clone()).await;
    let manager = PublishManager::with_defaults(&PublisherConfig::default()).unwrap();
    let target = PublishTarget::new(TYPE_HTTP).with_config("endpoint", &format!("{}/keys", base));

    let errs = manager.publish_all(&[target], &keypair()).await.unwrap_err();
    assert!(matches!(errs.failures[0].error, PublishError::InsecureEndpoint(_)));
    assert!(received.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_mixed_targets_all_attempted() {
    let received = Received::default();
    let base = spawn_endpoint(received.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let kp = keypair();
    let manager = PublishManager::with_defaults(&PublisherConfig::default()).unwrap();

    let targets = vec![
        plain_http_target(&format!("{}/down", base)),
        PublishTarget::new("gcs"),
        PublishTarget::new(TYPE_FILESYSTEM).with_config("path", dir.path().to_str().unwrap()),
        plain_http_target(&format!("{}/keys", base)),
    ];

    let errs = manager.publish_all(&targets, &kp).await.unwrap_err();
    assert_eq!(errs.indices(), vec![0, 1]);
    assert!(dir.path().join(format!("{}.pub", kp.key_id())).exists());
    assert_eq!(received.requests.lock().unwrap().len(), 1);
}

struct Recording {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Publisher for Recording {
    async fn publish(&self, _target: &PublishTarget, kp: &KeyPair) -> keywarden_publish::Result<()> {
        self.seen.lock().unwrap().push(kp.key_id().to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_custom_publisher_registration() {
    let recording = Arc::new(Recording {
        seen: Mutex::new(Vec::new()),
    });
    let mut manager = PublishManager::new();
    manager.register("jwks-cache", recording.clone());
    assert!(manager.supports("jwks-cache"));

    let kp = keypair();
    manager
        .publish_all(&[PublishTarget::new("jwks-cache"), PublishTarget::new("jwks-cache")], &kp)
        .await
        .unwrap();

    assert_eq!(*recording.seen.lock().unwrap(), vec![kp.key_id().to_string(); 2]);
}
