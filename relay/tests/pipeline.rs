//! End-to-end pipeline tests against an in-memory storage plane.
//!
//! The fake speaks just enough of the blob service wire protocol for the
//! worker: delegation keys, container creation, copy start, status reads
//! and deletes. Copy status progressions are scripted per test.

use async_trait::async_trait;
use blobrelay::provide_token::StaticTokenProvider;
use blobrelay::sas::{SasPermissions, UserDelegationKey, UserDelegationSas};
use blobrelay::{Config, Copier, Outcome, Relay, StorageAccount};
use blobrelay_core::time::{now, parse_rfc3339};
use blobrelay_core::{Context, ErrorKind, HttpSend, Result};
use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use pretty_assertions::assert_eq;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const BEARER: &str = "Bearer test-token";
const KEY_VALUE: &str = "ZmFrZS1wbGFuZS1rZXk=";

#[derive(Debug, Default)]
struct PlaneState {
    /// `account/container` pairs that exist.
    containers: HashSet<String>,
    /// Copy statuses handed out by successive status reads. Exhausted
    /// scripts report `success`.
    copy_script: VecDeque<&'static str>,
    /// `METHOD host/path` per request, in order.
    calls: Vec<String>,
    /// When set, deletes report the blob as already gone.
    blob_missing: bool,
}

#[derive(Clone, Debug, Default)]
struct FakeStoragePlane {
    state: Arc<Mutex<PlaneState>>,
}

impl FakeStoragePlane {
    fn with_script(script: &[&'static str]) -> Self {
        let plane = Self::default();
        plane.state.lock().unwrap().copy_script = script.iter().copied().collect();
        plane
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn set_blob_missing(&self) {
        self.state.lock().unwrap().blob_missing = true;
    }

    fn authorized(req: &Request<Bytes>) -> bool {
        req.headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            == Some(BEARER)
    }

    /// Check a token URI the way the service would: permission flag
    /// present and the current time inside the signed window.
    fn token_allows(uri: &str, permission: char) -> bool {
        let query = match uri.split_once('?') {
            Some((_, query)) => query,
            None => return false,
        };
        let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        let field = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };

        let has_permission = field("sp").is_some_and(|sp| sp.contains(permission));
        let signed = field("sig").is_some_and(|sig| !sig.is_empty());
        let window_open = match (field("st"), field("se")) {
            (Some(st), Some(se)) => match (parse_rfc3339(&st), parse_rfc3339(&se)) {
                (Ok(st), Ok(se)) => st <= now() && now() <= se,
                _ => false,
            },
            _ => false,
        };

        has_permission && signed && window_open
    }

    fn delegation_key_response(body: &str) -> Response<Bytes> {
        let field = |tag: &str| {
            let open = format!("<{tag}>");
            let close = format!("</{tag}>");
            body.split_once(&open)
                .and_then(|(_, rest)| rest.split_once(&close))
                .map(|(value, _)| value.to_string())
                .unwrap_or_default()
        };

        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <UserDelegationKey>\
             <SignedOid>f0f51068-7c3c-4d4a-9575-0e8f25a30ac1</SignedOid>\
             <SignedTid>72f988bf-86f1-41af-91ab-2d7cd011db47</SignedTid>\
             <SignedStart>{}</SignedStart>\
             <SignedExpiry>{}</SignedExpiry>\
             <SignedService>b</SignedService>\
             <SignedVersion>2022-11-02</SignedVersion>\
             <Value>{KEY_VALUE}</Value>\
             </UserDelegationKey>",
            field("Start"),
            field("Expiry"),
        );

        Response::builder()
            .status(StatusCode::OK)
            .body(Bytes::from(xml))
            .unwrap()
    }

    fn dispatch(&self, req: Request<Bytes>) -> Response<Bytes> {
        let host = req.uri().host().unwrap_or("").to_string();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or("").to_string();
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("{} {host}{path}", req.method()));

        let status = |code: StatusCode| {
            Response::builder()
                .status(code)
                .body(Bytes::new())
                .unwrap()
        };

        if req.method() == Method::POST && query.contains("comp=userdelegationkey") {
            if !Self::authorized(&req) {
                return status(StatusCode::UNAUTHORIZED);
            }
            let body = String::from_utf8_lossy(req.body()).to_string();
            return Self::delegation_key_response(&body);
        }

        if req.method() == Method::PUT && query.contains("restype=container") {
            if !Self::authorized(&req) {
                return status(StatusCode::UNAUTHORIZED);
            }
            let name = format!("{host}{path}");
            if self.state.lock().unwrap().containers.insert(name) {
                return status(StatusCode::CREATED);
            }
            return Response::builder()
                .status(StatusCode::CONFLICT)
                .header("x-ms-error-code", "ContainerAlreadyExists")
                .body(Bytes::new())
                .unwrap();
        }

        if req.method() == Method::PUT {
            if let Some(source) = req
                .headers()
                .get("x-ms-copy-source")
                .and_then(|v| v.to_str().ok())
            {
                let dest = req.uri().to_string();
                if !Self::token_allows(&dest, 'w') || !Self::token_allows(source, 'r') {
                    return status(StatusCode::FORBIDDEN);
                }
                return Response::builder()
                    .status(StatusCode::ACCEPTED)
                    .header("x-ms-copy-id", "copy-123")
                    .header("x-ms-copy-status", "pending")
                    .body(Bytes::new())
                    .unwrap();
            }
        }

        if req.method() == Method::HEAD {
            let reported = self
                .state
                .lock()
                .unwrap()
                .copy_script
                .pop_front()
                .unwrap_or("success");
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header("x-ms-copy-status", reported);
            if reported == "failed" || reported == "aborted" {
                builder = builder.header("x-ms-copy-status-description", "503 ServerBusy");
            }
            return builder.body(Bytes::new()).unwrap();
        }

        if req.method() == Method::DELETE {
            if !Self::authorized(&req) {
                return status(StatusCode::UNAUTHORIZED);
            }
            if self.state.lock().unwrap().blob_missing {
                return status(StatusCode::NOT_FOUND);
            }
            return status(StatusCode::ACCEPTED);
        }

        status(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[async_trait]
impl HttpSend for FakeStoragePlane {
    async fn http_send(&self, req: Request<Bytes>) -> Result<Response<Bytes>> {
        Ok(self.dispatch(req))
    }
}

fn test_ctx(plane: &FakeStoragePlane) -> Context {
    let _ = env_logger::builder().is_test(true).try_init();
    Context::new().with_http_send(plane.clone())
}

fn test_config() -> Config {
    Config {
        destination_endpoint: Some("https://acct2.blob.core.example".to_string()),
        sas_validity: Duration::from_secs(600),
        poll_interval: Duration::from_millis(20),
        poll_max_attempts: 10,
    }
}

fn source_account(ctx: &Context) -> StorageAccount {
    StorageAccount::new(
        ctx.clone(),
        "https://acct1.blob.core.example",
        Arc::new(StaticTokenProvider::new("test-token")),
    )
}

fn event_body(url: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "Topic": "/subscriptions/s1/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/acct1",
        "Subject": "/blobServices/default/containers/uploads",
        "EventType": "Microsoft.Storage.BlobCreated",
        "Id": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
        "Data": { "Url": url },
        "EventTime": "2026-08-29T10:00:00Z",
    }))
    .unwrap()
}

#[tokio::test]
async fn test_copy_polls_until_success() {
    let plane = FakeStoragePlane::with_script(&["pending", "pending", "success"]);
    let ctx = test_ctx(&plane);
    let account = source_account(&ctx);

    let source = account
        .issue_delegation_sas(
            "uploads",
            Some("report.pdf"),
            SasPermissions::READ,
            Duration::from_secs(600),
        )
        .await
        .unwrap();
    let dest = StorageAccount::new(
        ctx.clone(),
        "https://acct2.blob.core.example",
        Arc::new(StaticTokenProvider::new("test-token")),
    )
    .issue_delegation_sas(
        "uploads",
        Some("report.pdf"),
        SasPermissions::READ_WRITE,
        Duration::from_secs(600),
    )
    .await
    .unwrap();

    let started = Instant::now();
    let outcome = Copier::new(ctx)
        .with_poll_interval(Duration::from_millis(50))
        .copy(&source, &dest)
        .await
        .unwrap();

    assert_eq!(outcome.polls, 3);
    assert_eq!(outcome.copy_id.as_deref(), Some("copy-123"));
    // Two pending reads means two waits between the three status reads.
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_copy_failure_reports_the_service_description() {
    let plane = FakeStoragePlane::with_script(&["pending", "failed"]);
    let ctx = test_ctx(&plane);
    let account = source_account(&ctx);

    let source = account
        .issue_delegation_sas(
            "uploads",
            Some("report.pdf"),
            SasPermissions::READ,
            Duration::from_secs(600),
        )
        .await
        .unwrap();
    let dest = StorageAccount::new(
        ctx.clone(),
        "https://acct2.blob.core.example",
        Arc::new(StaticTokenProvider::new("test-token")),
    )
    .issue_delegation_sas(
        "uploads",
        Some("report.pdf"),
        SasPermissions::READ_WRITE,
        Duration::from_secs(600),
    )
    .await
    .unwrap();

    let err = Copier::new(ctx)
        .with_poll_interval(Duration::from_millis(10))
        .copy(&source, &dest)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CopyFailed);
    assert!(err.to_string().contains("503 ServerBusy"));
}

#[tokio::test]
async fn test_write_needs_the_write_permission() {
    let plane = FakeStoragePlane::default();
    let ctx = test_ctx(&plane);
    let account = source_account(&ctx);

    let source = account
        .issue_delegation_sas(
            "uploads",
            Some("report.pdf"),
            SasPermissions::READ,
            Duration::from_secs(600),
        )
        .await
        .unwrap();
    // A read-only token on the destination side must not start a copy.
    let dest = account
        .issue_delegation_sas(
            "uploads",
            Some("report.pdf"),
            SasPermissions::READ,
            Duration::from_secs(600),
        )
        .await
        .unwrap();

    let err = Copier::new(ctx).copy(&source, &dest).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let plane = FakeStoragePlane::default();
    let ctx = test_ctx(&plane);
    let account = source_account(&ctx);

    let source = account
        .issue_delegation_sas(
            "uploads",
            Some("report.pdf"),
            SasPermissions::READ,
            Duration::from_secs(600),
        )
        .await
        .unwrap();

    // Hand-build a destination token whose window closed an hour ago.
    let start = now() - chrono::TimeDelta::hours(2);
    let expiry = now() - chrono::TimeDelta::hours(1);
    let key = UserDelegationKey {
        signed_oid: "f0f51068-7c3c-4d4a-9575-0e8f25a30ac1".to_string(),
        signed_tid: "72f988bf-86f1-41af-91ab-2d7cd011db47".to_string(),
        signed_start: blobrelay_core::time::format_rfc3339(start),
        signed_expiry: blobrelay_core::time::format_rfc3339(expiry),
        signed_service: "b".to_string(),
        signed_version: "2022-11-02".to_string(),
        value: KEY_VALUE.to_string(),
    };
    let dest = UserDelegationSas::for_blob(
        "acct2",
        key,
        "uploads",
        "report.pdf",
        SasPermissions::READ_WRITE,
        start,
        expiry,
    )
    .token_uri("https://acct2.blob.core.example/uploads/report.pdf")
    .unwrap();

    let err = Copier::new(ctx).copy(&source, &dest).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn test_not_yet_valid_token_is_rejected() {
    let plane = FakeStoragePlane::default();
    let ctx = test_ctx(&plane);
    let account = source_account(&ctx);

    let source = account
        .issue_delegation_sas(
            "uploads",
            Some("report.pdf"),
            SasPermissions::READ,
            Duration::from_secs(600),
        )
        .await
        .unwrap();

    // A destination token whose window only opens an hour from now.
    let start = now() + chrono::TimeDelta::hours(1);
    let expiry = now() + chrono::TimeDelta::hours(2);
    let key = UserDelegationKey {
        signed_oid: "f0f51068-7c3c-4d4a-9575-0e8f25a30ac1".to_string(),
        signed_tid: "72f988bf-86f1-41af-91ab-2d7cd011db47".to_string(),
        signed_start: blobrelay_core::time::format_rfc3339(start),
        signed_expiry: blobrelay_core::time::format_rfc3339(expiry),
        signed_service: "b".to_string(),
        signed_version: "2022-11-02".to_string(),
        value: KEY_VALUE.to_string(),
    };
    let dest = UserDelegationSas::for_blob(
        "acct2",
        key,
        "uploads",
        "report.pdf",
        SasPermissions::READ_WRITE,
        start,
        expiry,
    )
    .token_uri("https://acct2.blob.core.example/uploads/report.pdf")
    .unwrap();

    let err = Copier::new(ctx).copy(&source, &dest).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn test_container_creation_is_idempotent() {
    let plane = FakeStoragePlane::default();
    let ctx = test_ctx(&plane);
    let account = source_account(&ctx);

    assert!(account.create_container_if_absent("uploads").await.unwrap());
    assert!(!account.create_container_if_absent("uploads").await.unwrap());
}

#[tokio::test]
async fn test_racing_container_creations_both_succeed() {
    let plane = FakeStoragePlane::default();
    let ctx = test_ctx(&plane);
    let a = source_account(&ctx);
    let b = source_account(&ctx);

    let (first, second) = tokio::join!(
        a.create_container_if_absent("racy"),
        b.create_container_if_absent("racy"),
    );

    // Exactly one creation wins, neither call errors.
    assert_ne!(first.unwrap(), second.unwrap());
}

#[tokio::test]
async fn test_pipeline_relocates_a_blob() {
    let plane = FakeStoragePlane::with_script(&["pending", "success"]);
    let ctx = test_ctx(&plane);
    let relay = Relay::new(ctx, test_config())
        .with_token_provider(StaticTokenProvider::new("test-token"));

    let body = event_body("https://acct1.blob.core.example/uploads/reports/2024/summary.pdf");
    let outcome = relay.handle(&body).await;

    let summary = match outcome {
        Outcome::Completed(summary) => summary,
        Outcome::Abandoned => panic!("transfer should complete"),
    };
    assert_eq!(
        summary.destination_url,
        "https://acct2.blob.core.example/uploads/reports/2024/summary.pdf"
    );
    assert!(summary.container_created);
    assert_eq!(summary.polls, 2);
    assert!(summary.source_deleted);

    let calls = plane.calls();
    assert!(calls.contains(&"PUT acct2.blob.core.example/uploads".to_string()));
    assert!(calls
        .contains(&"PUT acct2.blob.core.example/uploads/reports/2024/summary.pdf".to_string()));
    assert_eq!(
        calls.last().unwrap(),
        "DELETE acct1.blob.core.example/uploads/reports/2024/summary.pdf"
    );
}

#[tokio::test]
async fn test_pipeline_keeps_the_source_on_copy_failure() {
    let plane = FakeStoragePlane::with_script(&["failed"]);
    let ctx = test_ctx(&plane);
    let relay = Relay::new(ctx, test_config())
        .with_token_provider(StaticTokenProvider::new("test-token"));

    let body = event_body("https://acct1.blob.core.example/uploads/report.pdf");
    let outcome = relay.handle(&body).await;

    assert_eq!(outcome, Outcome::Abandoned);
    assert!(plane.calls().iter().all(|call| !call.starts_with("DELETE")));
}

#[tokio::test]
async fn test_pipeline_gives_up_after_the_poll_bound() {
    let plane = FakeStoragePlane::with_script(&[
        "pending", "pending", "pending", "pending", "pending",
    ]);
    let ctx = test_ctx(&plane);
    let mut config = test_config();
    config.poll_max_attempts = 2;
    let relay = Relay::new(ctx, config)
        .with_token_provider(StaticTokenProvider::new("test-token"));

    let body = event_body("https://acct1.blob.core.example/uploads/report.pdf");
    let err = relay.process(&body).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CopyTimeout);
    assert!(plane.calls().iter().all(|call| !call.starts_with("DELETE")));
}

#[tokio::test]
async fn test_pipeline_requires_a_destination() {
    let plane = FakeStoragePlane::default();
    let ctx = test_ctx(&plane);
    let mut config = test_config();
    config.destination_endpoint = None;
    let relay = Relay::new(ctx, config)
        .with_token_provider(StaticTokenProvider::new("test-token"));

    let body = event_body("https://acct1.blob.core.example/uploads/report.pdf");
    let err = relay.process(&body).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);

    assert_eq!(relay.handle(&body).await, Outcome::Abandoned);
}

#[tokio::test]
async fn test_pipeline_abandons_garbage_without_any_request() {
    let plane = FakeStoragePlane::default();
    let ctx = test_ctx(&plane);
    let relay = Relay::new(ctx, test_config())
        .with_token_provider(StaticTokenProvider::new("test-token"));

    let outcome = relay.handle(b"not an event").await;

    assert_eq!(outcome, Outcome::Abandoned);
    assert!(plane.calls().is_empty());
}

#[tokio::test]
async fn test_pipeline_tolerates_an_already_deleted_source() {
    let plane = FakeStoragePlane::with_script(&["success"]);
    plane.set_blob_missing();
    let ctx = test_ctx(&plane);
    let relay = Relay::new(ctx, test_config())
        .with_token_provider(StaticTokenProvider::new("test-token"));

    let body = event_body("https://acct1.blob.core.example/uploads/report.pdf");
    let summary = relay.process(&body).await.unwrap();

    assert!(!summary.source_deleted);
}
