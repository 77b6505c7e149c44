//! End-to-end pipeline tests against a scripted marketplace and catalog.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use wbsync::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use wbsync::marketplace::UploadEndpoint;
use wbsync::sync::SyncEngine;
use wbsync::{CatalogClient, Dimensions, MarketplaceClient, RateLimit, SyncError, SyncOptions};

/// Upper bound for one sync in these tests; hitting it means a hang.
const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

const WB: &str = "https://wb.test";
const CATALOG: &str = "http://catalog.test";

/// Serves catalog maps and listing pages from memory and records uploads.
#[derive(Default)]
struct ScriptedTransport {
    catalog: HashMap<&'static str, Value>,
    cards: Vec<Value>,
    upload_replies: Mutex<VecDeque<(u16, Value)>>,
    /// Upload requests past this count never complete.
    hang_after: Option<usize>,
    uploads: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    fn uploads(&self) -> Vec<(String, Value)> {
        self.uploads.lock().unwrap().clone()
    }

    fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    fn listing_page(&self, request: &HttpRequest) -> Value {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let cursor = &body["settings"]["cursor"];
        let after = cursor["nmID"].as_i64().unwrap_or(0);
        let limit = cursor["limit"].as_u64().unwrap_or(100) as usize;
        let cards: Vec<Value> = self
            .cards
            .iter()
            .filter(|card| card["nmID"].as_i64().unwrap() > after)
            .take(limit)
            .cloned()
            .collect();
        json!({ "cards": cards })
    }
}

fn response(status: u16, body: &Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        body: serde_json::to_vec(body).unwrap(),
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        if let Some(path) = request.url.strip_prefix(&format!("{CATALOG}/api/")) {
            let body = self.catalog.get(path).cloned().unwrap_or_else(|| json!({}));
            return Ok(response(200, &body));
        }
        if request.url.contains("/content/v2/get/cards/list") {
            return Ok(response(200, &self.listing_page(&request)));
        }

        let seen = {
            let mut uploads = self.uploads.lock().unwrap();
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            uploads.push((request.url.clone(), body));
            uploads.len()
        };
        if self.hang_after.is_some_and(|limit| seen > limit) {
            std::future::pending::<()>().await;
        }

        let reply = self.upload_replies.lock().unwrap().pop_front();
        let (status, body) = reply.unwrap_or((200, json!({})));
        Ok(response(status, &body))
    }
}

fn card(id: i64, photos: usize, dimensions: (i64, i64, i64)) -> Value {
    let photos: Vec<Value> = (0..photos)
        .map(|n| json!({"big": format!("https://wb.test/{id}/{n}.jpg")}))
        .collect();
    json!({
        "nmID": id,
        "vendorCode": format!("id-{id}-7"),
        "title": "old",
        "updatedAt": "2024-01-01T00:00:00Z",
        "photos": photos,
        "dimensions": {"length": dimensions.0, "width": dimensions.1, "height": dimensions.2}
    })
}

/// A catalog that fully describes `ids`, with `urls` media URLs per id.
fn catalog(ids: impl IntoIterator<Item = i64> + Clone, urls: usize) -> HashMap<&'static str, Value> {
    let per_id = |f: &dyn Fn(i64) -> Value| -> Value {
        Value::Object(ids.clone().into_iter().map(|id| (id.to_string(), f(id))).collect())
    };
    HashMap::from([
        ("globalids", json!(ids.clone().into_iter().collect::<Vec<_>>())),
        ("appellations", per_id(&|id: i64| json!(format!("Кружка керамическая {id}")))),
        ("descriptions", per_id(&|id: i64| json!(format!("<p>Кружка {id}</p>")))),
        ("brands", per_id(&|_: i64| json!("Acme"))),
        ("barcodes", per_id(&|id: i64| json!([format!("4600000{id}")]))),
        ("price", per_id(&|_: i64| json!({"Z": 100}))),
        (
            "media",
            per_id(&|id: i64| {
                json!((0..urls).map(|n| format!("https://img.test/{id}/{n}.jpg")).collect::<Vec<_>>())
            }),
        ),
    ])
}

fn options() -> SyncOptions {
    let fast = RateLimit {
        per_minute: 60_000,
        burst: 1_000,
    };
    SyncOptions {
        limit: 1_000,
        workers: 5,
        listing_rate: fast,
        upload_rate: fast,
        media_rate: fast,
        package_defaults: Dimensions::new(100, 100, 100),
        identity_code: 7,
        ..SyncOptions::default()
    }
}

fn engine(transport: &Arc<ScriptedTransport>, options: SyncOptions, cancel: CancellationToken) -> SyncEngine {
    let shared: Arc<dyn HttpTransport> = transport.clone();
    SyncEngine::builder()
        .marketplace(MarketplaceClient::new_with_transport(WB, "token", Arc::clone(&shared)))
        .catalog(CatalogClient::new_with_transport(CATALOG, shared).unwrap())
        .options(options)
        .cancel(cancel)
        .build()
        .unwrap()
}

fn sent_ids(uploads: &[(String, Value)]) -> Vec<i64> {
    let mut ids: Vec<i64> = uploads
        .iter()
        .flat_map(|(_, body)| body.as_array().cloned().unwrap_or_default())
        .map(|card| card["nmID"].as_i64().unwrap())
        .collect();
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn empty_listing_uploads_nothing() {
    let transport = Arc::new(ScriptedTransport {
        catalog: catalog(1..=10, 1),
        ..ScriptedTransport::default()
    });

    let result = tokio::time::timeout(
        SYNC_TIMEOUT,
        engine(&transport, options(), CancellationToken::new()).rename(),
    )
    .await
    .expect("sync should finish");

    assert!(result.is_success());
    assert_eq!(result.updated, 0);
    assert_eq!(result.metrics.dispatched, 0);
    assert_eq!(transport.upload_count(), 0);
}

#[tokio::test]
async fn items_missing_from_catalog_are_skipped() {
    let transport = Arc::new(ScriptedTransport {
        catalog: catalog(1..=70, 1),
        cards: (1..=100).map(|id| card(id, 1, (10, 10, 10))).collect(),
        ..ScriptedTransport::default()
    });

    let result = tokio::time::timeout(
        SYNC_TIMEOUT,
        engine(&transport, options(), CancellationToken::new()).rename(),
    )
    .await
    .expect("sync should finish");

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.metrics.dispatched, 70);
    assert_eq!(result.metrics.processed, 70);
    assert_eq!(result.updated, 70);
    assert!(result.metrics.errored >= 30);
    assert_eq!(sent_ids(&transport.uploads()), (1..=70).collect::<Vec<_>>());
}

#[tokio::test]
async fn banned_articles_are_dropped_and_rest_uploaded() {
    let transport = Arc::new(ScriptedTransport {
        catalog: catalog(40..=44, 1),
        cards: (40..=44).map(|id| card(id, 1, (10, 10, 10))).collect(),
        upload_replies: Mutex::new(VecDeque::from([(
            400,
            json!({"additionalErrors": {"забаненные артикулы WB": "42, 43"}}),
        )])),
        ..ScriptedTransport::default()
    });

    let result = tokio::time::timeout(
        SYNC_TIMEOUT,
        engine(&transport, options(), CancellationToken::new()).brand(),
    )
    .await
    .expect("sync should finish");

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.updated, 3);
    assert_eq!(result.metrics.errored, 2);

    let uploads = transport.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(sent_ids(&uploads[..1]), vec![40, 41, 42, 43, 44]);
    assert_eq!(sent_ids(&uploads[1..]), vec![40, 41, 44]);
}

#[tokio::test]
async fn media_with_fewer_urls_than_photos_is_not_uploaded() {
    let transport = Arc::new(ScriptedTransport {
        catalog: catalog([1], 1),
        cards: vec![card(1, 2, (10, 10, 10))],
        ..ScriptedTransport::default()
    });

    let result = tokio::time::timeout(
        SYNC_TIMEOUT,
        engine(&transport, options(), CancellationToken::new()).media(),
    )
    .await
    .expect("sync should finish");

    assert!(result.is_success());
    assert_eq!(result.updated, 0);
    assert_eq!(result.metrics.errored, 1);
    assert_eq!(transport.upload_count(), 0);
}

#[tokio::test]
async fn media_update_carries_urls_and_placeholder() {
    let transport = Arc::new(ScriptedTransport {
        catalog: catalog([1], 1),
        cards: vec![card(1, 1, (10, 10, 10))],
        ..ScriptedTransport::default()
    });

    let result = tokio::time::timeout(
        SYNC_TIMEOUT,
        engine(&transport, options(), CancellationToken::new()).media(),
    )
    .await
    .expect("sync should finish");

    assert_eq!(result.updated, 1);
    let uploads = transport.uploads();
    assert!(uploads[0].0.ends_with(UploadEndpoint::Media.path()));
    assert_eq!(uploads[0].1["nmId"], 1);
    assert_eq!(
        uploads[0].1["data"],
        json!([
            "https://img.test/1/0.jpg",
            "https://img.test/1/0.jpg",
            wbsync::sync::ANONYMOUS_PACKAGE_IMAGE
        ])
    );
}

#[tokio::test]
async fn package_fills_zero_dimensions_from_defaults() {
    let transport = Arc::new(ScriptedTransport {
        catalog: catalog([1], 1),
        cards: vec![card(1, 1, (0, 50, 0))],
        ..ScriptedTransport::default()
    });

    let result = tokio::time::timeout(
        SYNC_TIMEOUT,
        engine(&transport, options(), CancellationToken::new()).package(),
    )
    .await
    .expect("sync should finish");

    assert_eq!(result.updated, 1);
    let uploads = transport.uploads();
    assert_eq!(
        uploads[0].1[0]["dimensions"],
        json!({"length": 100, "width": 50, "height": 100})
    );
}

#[tokio::test]
async fn rename_normalises_catalog_text() {
    let transport = Arc::new(ScriptedTransport {
        catalog: catalog([1], 1),
        cards: vec![card(1, 1, (10, 10, 10))],
        ..ScriptedTransport::default()
    });

    let result = tokio::time::timeout(
        SYNC_TIMEOUT,
        engine(&transport, options(), CancellationToken::new()).rename(),
    )
    .await
    .expect("sync should finish");

    assert_eq!(result.updated, 1);
    let sent = &transport.uploads()[0].1[0];
    assert_eq!(sent["title"], "Кружка керамическая 1");
    assert_eq!(sent["description"], "Кружка 1");
    assert_eq!(sent["vendorCode"], "id-1-7");
}

#[tokio::test]
async fn cancellation_returns_partial_count() {
    let transport = Arc::new(ScriptedTransport {
        catalog: catalog(1..=200, 2),
        cards: (1..=200).map(|id| card(id, 1, (10, 10, 10))).collect(),
        hang_after: Some(50),
        ..ScriptedTransport::default()
    });
    let cancel = CancellationToken::new();
    let engine = engine(&transport, options(), cancel.clone());

    let watcher = {
        let transport = Arc::clone(&transport);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while transport.upload_count() <= 50 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            cancel.cancel();
        })
    };

    let result = tokio::time::timeout(SYNC_TIMEOUT, engine.media())
        .await
        .expect("cancelled sync should return promptly");
    watcher.await.unwrap();

    assert_eq!(result.updated, 50);
    assert!(matches!(result.error, Some(SyncError::Cancelled)));
}

#[tokio::test]
async fn cancellation_during_final_upload_is_reported() {
    let transport = Arc::new(ScriptedTransport {
        catalog: catalog(1..=3, 1),
        cards: (1..=3).map(|id| card(id, 1, (10, 10, 10))).collect(),
        hang_after: Some(0),
        ..ScriptedTransport::default()
    });
    let cancel = CancellationToken::new();
    let engine = engine(&transport, options(), cancel.clone());

    let watcher = {
        let transport = Arc::clone(&transport);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while transport.upload_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            cancel.cancel();
        })
    };

    let result = tokio::time::timeout(SYNC_TIMEOUT, engine.brand())
        .await
        .expect("cancelled sync should return promptly");
    watcher.await.unwrap();

    // The only batch was in flight; nothing was confirmed.
    assert_eq!(transport.upload_count(), 1);
    assert_eq!(result.updated, 0);
    assert!(matches!(result.error, Some(SyncError::Cancelled)));
}

#[tokio::test]
async fn create_indexes_listing_beyond_item_budget() {
    let transport = Arc::new(ScriptedTransport {
        catalog: catalog(1..=8, 1),
        cards: (1..=4).map(|id| card(id, 1, (10, 10, 10))).collect(),
        ..ScriptedTransport::default()
    });
    let options = SyncOptions {
        limit: 2,
        subject_id: 3091,
        ..options()
    };

    let result = tokio::time::timeout(
        SYNC_TIMEOUT,
        engine(&transport, options, CancellationToken::new()).create(),
    )
    .await
    .expect("sync should finish");

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.updated, 2);

    let uploads = transport.uploads();
    assert!(uploads.iter().all(|(url, _)| url.ends_with(UploadEndpoint::Create.path())));
    let codes: Vec<String> = uploads
        .iter()
        .flat_map(|(_, body)| body.as_array().cloned().unwrap_or_default())
        .map(|card| card["variants"][0]["vendorCode"].as_str().unwrap().to_string())
        .collect();
    // 1..=4 are listed; the budget takes the first two missing ids.
    assert_eq!(codes, vec!["id-5-7", "id-6-7"]);
}
