//! Integration tests for the Lodestone backend.

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::generator::{DrawRange, ListGenerator, RarityWeights};
use crate::history::{FileKeyValueStore, ListHistory, HISTORY_CAPACITY};
use crate::settings::SettingsMachine;
use crate::store::SqliteDocumentStore;
use crate::{create_router, AppState};

const ADMIN_KEY: &str = "test-admin-key";

/// Test fixture for integration tests.
struct TestFixture {
    /// Client sending the admin key
    admin: Client,
    /// Client without credentials
    public: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some(ADMIN_KEY.to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");
        let history_dir = temp_dir.path().join("history");

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool.clone()));

        let documents = Arc::new(SqliteDocumentStore::new(pool));
        let settings = Arc::new(SettingsMachine::start(documents).await);

        let kv = Arc::new(
            FileKeyValueStore::open(&history_dir)
                .await
                .expect("Failed to open history"),
        );
        let history = Arc::new(ListHistory::new(kv));

        let config = Config {
            api_psk: psk.clone(),
            db_path,
            history_dir,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            rarity_weights: RarityWeights::default(),
            draws: DrawRange::default(),
        };

        let state = AppState {
            repo,
            settings,
            history,
            generator: Arc::new(ListGenerator::new(
                config.rarity_weights.clone(),
                config.draws,
            )),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut admin_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            admin_builder = admin_builder.default_headers(headers);
        }

        TestFixture {
            admin: admin_builder.build().unwrap(),
            public: Client::new(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn create_hub(&self, name: &str, is_public: bool) -> String {
        let resp = self
            .admin
            .post(self.url("/api/hubs"))
            .json(&json!({ "name": name, "isPublic": is_public }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_provision(&self, hub_id: &str, name: &str, rarity: &str, price: f64) -> String {
        let resp = self
            .admin
            .post(self.url("/api/provisions"))
            .json(&json!({
                "name": name,
                "rarity": rarity,
                "price": price,
                "hubId": hub_id
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn generate(&self, hub_id: &str) -> reqwest::Response {
        self.public
            .post(self.url("/api/generate"))
            .json(&json!({ "hubId": hub_id }))
            .send()
            .await
            .unwrap()
    }

    async fn generate_as(&self, client: &str, hub_id: &str) -> reqwest::Response {
        self.public
            .post(self.url("/api/generate"))
            .header("x-client-id", client)
            .json(&json!({ "hubId": hub_id }))
            .send()
            .await
            .unwrap()
    }

    async fn history_of(&self, client: &str) -> Vec<Value> {
        let resp = self
            .public
            .get(self.url("/api/history"))
            .header("x-client-id", client)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"].as_array().unwrap().clone()
    }

    async fn clear_history_of(&self, client: &str) -> reqwest::Response {
        self.public
            .delete(self.url("/api/history"))
            .header("x-client-id", client)
            .send()
            .await
            .unwrap()
    }

    async fn forest_cache(&self) -> (String, String, String) {
        let hub_id = self.create_hub("Forest Cache", true).await;
        let p1 = self.create_provision(&hub_id, "Rations", "common", 5.0).await;
        let p2 = self.create_provision(&hub_id, "Elven Cloak", "rare", 50.0).await;
        (hub_id, p1, p2)
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .public
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .public
        .get(fixture.url("/api/hubs"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = fixture
        .public
        .get(fixture.url("/api/settings"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = fixture
        .admin
        .get(fixture.url("/api/hubs"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_public_routes_need_no_key() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .public
        .get(fixture.url("/api/public/hubs"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    assert!(fixture.history_of("device-1").await.is_empty());
}

#[tokio::test]
async fn test_hub_and_provision_crud() {
    let fixture = TestFixture::new().await;
    let hub_id = fixture.create_hub("Forest Cache", true).await;
    let provision_id = fixture
        .create_provision(&hub_id, "Rations", "common", 5.0)
        .await;

    // Hub carries its provisions
    let resp = fixture
        .admin
        .get(fixture.url(&format!("/api/hubs/{}", hub_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["name"], "Forest Cache");
    assert_eq!(body["data"]["provisions"][0]["id"], provision_id.as_str());

    // Update provision
    let resp = fixture
        .admin
        .put(fixture.url(&format!("/api/provisions/{}", provision_id)))
        .json(&json!({ "rarity": "very_rare", "price": 75.5, "expectedVersion": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["rarity"], "very_rare");
    assert_eq!(body["data"]["price"], 75.5);
    assert_eq!(body["data"]["version"], 2);

    // Filter provisions by hub
    let resp = fixture
        .admin
        .get(fixture.url(&format!("/api/provisions?hubId={}", hub_id)))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Update hub visibility
    let resp = fixture
        .admin
        .put(fixture.url(&format!("/api/hubs/{}", hub_id)))
        .json(&json!({ "isPublic": false }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["isPublic"], false);

    // Delete provision, then hub (confirmation is on by default)
    let resp = fixture
        .admin
        .delete(fixture.url(&format!("/api/provisions/{}?confirm=true", provision_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .admin
        .delete(fixture.url(&format!("/api/hubs/{}?confirm=true", hub_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .admin
        .get(fixture.url(&format!("/api/hubs/{}", hub_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_optimistic_concurrency_conflict() {
    let fixture = TestFixture::new().await;
    let hub_id = fixture.create_hub("Forest Cache", true).await;

    let resp = fixture
        .admin
        .put(fixture.url(&format!("/api/hubs/{}", hub_id)))
        .json(&json!({ "name": "Stale", "expectedVersion": 7 }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VERSION_MISMATCH");
    assert_eq!(body["error"]["details"]["currentVersion"], 1);
}

#[tokio::test]
async fn test_validation_errors() {
    let fixture = TestFixture::new().await;
    let hub_id = fixture.create_hub("Forest Cache", true).await;

    let resp = fixture
        .admin
        .post(fixture.url("/api/hubs"))
        .json(&json!({ "name": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let resp = fixture
        .admin
        .post(fixture.url("/api/provisions"))
        .json(&json!({ "name": "Free Lunch", "rarity": "common", "price": 0, "hubId": hub_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .admin
        .post(fixture.url("/api/provisions"))
        .json(&json!({ "name": "Orphan", "rarity": "common", "price": 1, "hubId": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_delete_requires_confirmation_until_disabled() {
    let fixture = TestFixture::new().await;
    let hub_id = fixture.create_hub("Forest Cache", true).await;

    let resp = fixture
        .admin
        .delete(fixture.url(&format!("/api/hubs/{}", hub_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CONFIRMATION_REQUIRED");

    let resp = fixture
        .admin
        .post(fixture.url("/api/settings/deletion-confirmation"))
        .json(&json!({ "enabled": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .admin
        .delete(fixture.url(&format!("/api/hubs/{}", hub_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_settings_toggle_round_trip() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .admin
        .get(fixture.url("/api/settings"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["phase"], "ENABLED");
    assert_eq!(body["data"]["settings"]["showDeletionConfirmation"], true);
    assert!(body["data"]["settings"]["deletionConfirmationDisabledAt"].is_null());

    let resp = fixture
        .admin
        .post(fixture.url("/api/settings/deletion-confirmation"))
        .json(&json!({ "enabled": false }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["phase"], "DISABLED_PENDING_REVERT");
    assert!(body["data"]["settings"]["deletionConfirmationDisabledAt"].is_string());
    assert!(body["data"]["revertAt"].is_string());

    let resp = fixture
        .admin
        .post(fixture.url("/api/settings/deletion-confirmation"))
        .json(&json!({ "enabled": true }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["phase"], "ENABLED");
    assert!(body["data"]["settings"]["deletionConfirmationDisabledAt"].is_null());
    assert!(body["data"].get("revertAt").is_none());
}

#[tokio::test]
async fn test_settings_update_rejects_broken_invariant() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .admin
        .put(fixture.url("/api/settings"))
        .json(&json!({
            "showDeletionConfirmation": false,
            "deletionConfirmationDisabledAt": null
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    // Confirmation cannot be pushed off indefinitely with a future timestamp.
    let resp = fixture
        .admin
        .put(fixture.url("/api/settings"))
        .json(&json!({
            "showDeletionConfirmation": false,
            "deletionConfirmationDisabledAt": "9999-01-01T00:00:00Z"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = fixture
        .admin
        .get(fixture.url("/api/settings"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["phase"], "ENABLED");
}

#[tokio::test]
async fn test_generate_forest_cache() {
    let fixture = TestFixture::new().await;
    let (hub_id, p1, p2) = fixture.forest_cache().await;

    let resp = fixture.generate(&hub_id).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let data = &body["data"];
    assert_eq!(data["hubName"], "Forest Cache");
    assert_eq!(data["hubId"], hub_id.as_str());

    let items = data["items"].as_array().unwrap();
    assert!(!items.is_empty());

    let mut seen = HashSet::new();
    for item in items {
        let id = item["id"].as_str().unwrap();
        assert!(id == p1 || id == p2);
        assert!(seen.insert(id.to_string()), "duplicate line for {}", id);
        assert!(item["count"].as_u64().unwrap() >= 1);
    }
}

#[tokio::test]
async fn test_generate_rejects_empty_private_and_unknown_hubs() {
    let fixture = TestFixture::new().await;

    let empty = fixture.create_hub("Empty Larder", true).await;
    let resp = fixture.generate(&empty).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let private = fixture.create_hub("Secret Vault", false).await;
    fixture
        .create_provision(&private, "Crown", "legendary", 1000.0)
        .await;
    assert_eq!(fixture.generate(&private).await.status(), 404);

    assert_eq!(fixture.generate("no-such-hub").await.status(), 404);
}

#[tokio::test]
async fn test_generated_lists_are_recorded_newest_first() {
    let fixture = TestFixture::new().await;
    let (hub_id, _, _) = fixture.forest_cache().await;

    let first: Value = fixture.generate_as("device-1", &hub_id).await.json().await.unwrap();
    let second: Value = fixture.generate_as("device-1", &hub_id).await.json().await.unwrap();

    let lists = fixture.history_of("device-1").await;
    assert_eq!(lists.len(), 2);
    assert_eq!(lists[0]["id"], second["data"]["id"]);
    assert_eq!(lists[1]["id"], first["data"]["id"]);
    assert!(lists[0]["items"][0]["provisionId"].is_string());

    // Without a client id the list is returned but not recorded anywhere.
    assert_eq!(fixture.generate(&hub_id).await.status(), 200);
    assert_eq!(fixture.history_of("device-1").await.len(), 2);
}

#[tokio::test]
async fn test_history_is_capped_and_clearable() {
    let fixture = TestFixture::new().await;
    let (hub_id, _, _) = fixture.forest_cache().await;

    for _ in 0..=HISTORY_CAPACITY {
        assert_eq!(fixture.generate_as("device-1", &hub_id).await.status(), 200);
    }
    assert_eq!(fixture.history_of("device-1").await.len(), HISTORY_CAPACITY);

    for _ in 0..2 {
        assert_eq!(fixture.clear_history_of("device-1").await.status(), 200);
    }
    assert!(fixture.history_of("device-1").await.is_empty());
}

#[tokio::test]
async fn test_clearing_history_only_affects_the_caller() {
    let fixture = TestFixture::new().await;
    let (hub_id, _, _) = fixture.forest_cache().await;

    assert_eq!(fixture.generate_as("alice", &hub_id).await.status(), 200);
    assert_eq!(fixture.generate_as("bob", &hub_id).await.status(), 200);

    // Anonymous clears are rejected outright.
    let resp = fixture
        .public
        .delete(fixture.url("/api/history"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    assert_eq!(fixture.clear_history_of("mallory").await.status(), 200);
    assert_eq!(fixture.clear_history_of("bob").await.status(), 200);

    assert_eq!(fixture.history_of("alice").await.len(), 1);
    assert!(fixture.history_of("bob").await.is_empty());
}

#[tokio::test]
async fn test_invalid_client_id_is_rejected() {
    let fixture = TestFixture::new().await;
    let (hub_id, _, _) = fixture.forest_cache().await;

    let resp = fixture.generate_as("../escape", &hub_id).await;
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .public
        .get(fixture.url("/api/history"))
        .header("x-client-id", "has.dot")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_not_found_errors() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .admin
        .get(fixture.url("/api/hubs/non-existent-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let resp = fixture
        .admin
        .get(fixture.url("/api/provisions/non-existent-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
