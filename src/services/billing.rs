use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

type HmacSha256 = Hmac<Sha256>;

/// Subscription state for one company, as last reported by the payment
/// provider. Persisted in a flat JSON file keyed by company id;
/// concurrent webhook deliveries resolve last-write-wins.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BillingRecord {
    pub active: bool,
    pub status: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub price_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub active_price_ids: Vec<String>,
    #[serde(default)]
    pub active_product_ids: Vec<String>,
}

impl Default for BillingRecord {
    fn default() -> Self {
        Self {
            active: false,
            status: "inactive".to_string(),
            updated_at: Utc::now(),
            customer_id: None,
            price_id: None,
            product_id: None,
            active_price_ids: Vec::new(),
            active_product_ids: Vec::new(),
        }
    }
}

#[derive(Clone)]
struct CachedRecord {
    record: BillingRecord,
    fetched_at: Instant,
}

/// Caller-supplied checkout inputs. Absent fields fall back to the
/// configured defaults.
#[derive(Debug, Clone, Default)]
pub struct CheckoutRequest {
    pub company_id: String,
    pub price_id: Option<String>,
    pub customer_email: Option<String>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

pub struct BillingService {
    store_path: PathBuf,
    // Serializes read-modify-write cycles on the store file
    store_lock: RwLock<()>,
    cache: DashMap<String, CachedRecord>,
    cache_ttl: Duration,
    http: reqwest::Client,
    stripe_secret_key: Option<String>,
    stripe_price_id: Option<String>,
    stripe_api_base: String,
    checkout_success_url: Option<String>,
    checkout_cancel_url: Option<String>,
    event_sender: EventSender,
}

impl BillingService {
    pub fn new(config: &AppConfig, event_sender: EventSender) -> Result<Arc<Self>, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.stripe_timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;

        Ok(Arc::new(Self {
            store_path: PathBuf::from(&config.billing_store_path),
            store_lock: RwLock::new(()),
            cache: DashMap::new(),
            cache_ttl: Duration::from_secs(config.billing_cache_ttl_secs),
            http,
            stripe_secret_key: config.stripe_secret_key.clone(),
            stripe_price_id: config.stripe_price_id.clone(),
            stripe_api_base: config.stripe_api_base.clone(),
            checkout_success_url: config.checkout_success_url.clone(),
            checkout_cancel_url: config.checkout_cancel_url.clone(),
            event_sender,
        }))
    }

    async fn load_store(&self) -> Result<HashMap<String, BillingRecord>, ServiceError> {
        match tokio::fs::read(&self.store_path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist_store(
        &self,
        store: &HashMap<String, BillingRecord>,
    ) -> Result<(), ServiceError> {
        let bytes = serde_json::to_vec_pretty(store)?;
        tokio::fs::write(&self.store_path, bytes).await?;
        Ok(())
    }

    /// Current billing record for a company. Companies the provider never
    /// reported on get the default inactive record.
    pub async fn subscription_status(
        &self,
        company_id: &str,
    ) -> Result<BillingRecord, ServiceError> {
        if let Some(cached) = self.cache.get(company_id) {
            if cached.fetched_at.elapsed() < self.cache_ttl {
                return Ok(cached.record.clone());
            }
        }

        let _guard = self.store_lock.read().await;
        let store = self.load_store().await?;
        let record = store.get(company_id).cloned().unwrap_or_default();
        self.cache.insert(
            company_id.to_string(),
            CachedRecord {
                record: record.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(record)
    }

    pub async fn is_active(&self, company_id: &str) -> Result<bool, ServiceError> {
        Ok(self.subscription_status(company_id).await?.active)
    }

    /// Readback probe for the health endpoint: the store file must parse
    /// (or be absent, which reads as an empty store).
    pub async fn store_health(&self) -> Result<(), ServiceError> {
        let _guard = self.store_lock.read().await;
        self.load_store().await.map(|_| ())
    }

    async fn upsert<F>(&self, company_id: &str, mutate: F) -> Result<BillingRecord, ServiceError>
    where
        F: FnOnce(&mut BillingRecord),
    {
        let _guard = self.store_lock.write().await;
        let mut store = self.load_store().await?;
        let record = store.entry(company_id.to_string()).or_default();
        mutate(record);
        record.updated_at = Utc::now();
        let snapshot = record.clone();
        self.persist_store(&store).await?;
        self.cache.remove(company_id);

        self.event_sender
            .send(Event::BillingStatusUpdated {
                company_id: company_id.to_string(),
                status: snapshot.status.clone(),
                active: snapshot.active,
                at: snapshot.updated_at,
            })
            .await;
        Ok(snapshot)
    }

    /// Applies one provider event to the store. Unknown event types and
    /// events that carry no resolvable company id are logged and ignored.
    #[instrument(skip(self, object))]
    pub async fn apply_provider_event(
        &self,
        event_type: &str,
        object: &Value,
    ) -> Result<(), ServiceError> {
        let Some(company_id) = resolve_company_id(object) else {
            warn!(event_type, "billing event carries no company id; ignored");
            return Ok(());
        };

        match event_type {
            "checkout.session.completed" => {
                let customer = string_at(object, &["customer"]);
                self.upsert(&company_id, |r| {
                    r.active = true;
                    r.status = "active".to_string();
                    if customer.is_some() {
                        r.customer_id = customer;
                    }
                })
                .await?;
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                let status = string_at(object, &["status"]).unwrap_or_else(|| "unknown".into());
                let active = status == "active" || status == "trialing";
                let customer = string_at(object, &["customer"]);
                let (price_ids, product_ids) = subscription_items(object);
                self.upsert(&company_id, |r| {
                    r.active = active;
                    r.status = status;
                    if customer.is_some() {
                        r.customer_id = customer;
                    }
                    r.price_id = price_ids.first().cloned();
                    r.product_id = product_ids.first().cloned();
                    r.active_price_ids = price_ids;
                    r.active_product_ids = product_ids;
                })
                .await?;
            }
            "customer.subscription.deleted" => {
                self.upsert(&company_id, |r| {
                    r.active = false;
                    r.status = "canceled".to_string();
                    r.active_price_ids.clear();
                    r.active_product_ids.clear();
                })
                .await?;
            }
            "invoice.payment_succeeded" => {
                self.upsert(&company_id, |r| {
                    r.active = true;
                    r.status = "active".to_string();
                })
                .await?;
            }
            "invoice.payment_failed" => {
                self.upsert(&company_id, |r| {
                    r.active = false;
                    r.status = "past_due".to_string();
                })
                .await?;
            }
            other => {
                info!(event_type = other, "unhandled billing event type");
            }
        }
        Ok(())
    }

    fn secret_key(&self) -> Result<&str, ServiceError> {
        self.stripe_secret_key
            .as_deref()
            .ok_or_else(|| ServiceError::MissingConfiguration("stripe_secret_key".into()))
    }

    /// Form body for a checkout session. Request fields win over the
    /// configured defaults; a price and both redirect URLs must come from
    /// one of the two.
    fn checkout_form(&self, request: &CheckoutRequest) -> Result<Vec<(String, String)>, ServiceError> {
        let price = request
            .price_id
            .clone()
            .or_else(|| self.stripe_price_id.clone())
            .ok_or_else(|| ServiceError::MissingConfiguration("stripe_price_id".into()))?;
        let success_url = request
            .success_url
            .clone()
            .or_else(|| self.checkout_success_url.clone())
            .ok_or_else(|| ServiceError::MissingConfiguration("checkout_success_url".into()))?;
        let cancel_url = request
            .cancel_url
            .clone()
            .or_else(|| self.checkout_cancel_url.clone())
            .ok_or_else(|| ServiceError::MissingConfiguration("checkout_cancel_url".into()))?;

        let mut params = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), price),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), success_url),
            ("cancel_url".to_string(), cancel_url),
            (
                "client_reference_id".to_string(),
                request.company_id.clone(),
            ),
            ("metadata[companyId]".to_string(), request.company_id.clone()),
        ];
        if let Some(email) = &request.customer_email {
            params.push(("customer_email".to_string(), email.clone()));
        }
        Ok(params)
    }

    /// Creates a hosted checkout session and returns its id and redirect URL
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<Value, ServiceError> {
        let key = self.secret_key()?;
        let params = self.checkout_form(request)?;

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.stripe_api_base))
            .bearer_auth(key)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalApiError(format!(
                "checkout session creation failed with {}: {}",
                status, body
            )));
        }
        Ok(response.json().await?)
    }

    /// Lists the active subscription prices offered by the provider
    pub async fn list_prices(&self) -> Result<Value, ServiceError> {
        let key = self.secret_key()?;
        let response = self
            .http
            .get(format!(
                "{}/v1/prices?active=true&limit=100&expand[]=data.product",
                self.stripe_api_base
            ))
            .bearer_auth(key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalApiError(format!(
                "price listing failed with {}: {}",
                status, body
            )));
        }
        Ok(response.json().await?)
    }
}

/// Verifies a `t=...,v1=...` signature header against the raw payload.
/// The signed message is `"{t}.{payload}"`, HMAC-SHA256 under the endpoint
/// secret; any matching `v1` candidate within the timestamp tolerance passes.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_secs: Option<u64>,
) -> Result<(), ServiceError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse().ok();
            }
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| ServiceError::BadRequest("signature header has no timestamp".into()))?;
    if candidates.is_empty() {
        return Err(ServiceError::BadRequest(
            "signature header has no v1 signature".into(),
        ));
    }

    if let Some(tolerance) = tolerance_secs {
        let age = (Utc::now().timestamp() - timestamp).unsigned_abs();
        if age > tolerance {
            return Err(ServiceError::BadRequest(format!(
                "signature timestamp outside tolerance ({}s old)",
                age
            )));
        }
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    for candidate in candidates {
        let Ok(bytes) = hex::decode(candidate) else {
            continue;
        };
        // verify_slice is constant-time
        if mac.clone().verify_slice(&bytes).is_ok() {
            return Ok(());
        }
    }

    Err(ServiceError::BadRequest(
        "no signature matched the payload".into(),
    ))
}

/// Computes the signature header for a payload. Test helper for exercising
/// the verification path end to end.
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().map(str::to_string)
}

/// The company id travels as `client_reference_id` on checkout sessions and
/// as `metadata.companyId` everywhere else; invoices nest it under
/// `subscription_details.metadata`.
fn resolve_company_id(object: &Value) -> Option<String> {
    string_at(object, &["client_reference_id"])
        .or_else(|| string_at(object, &["metadata", "companyId"]))
        .or_else(|| string_at(object, &["subscription_details", "metadata", "companyId"]))
}

fn subscription_items(object: &Value) -> (Vec<String>, Vec<String>) {
    let mut price_ids = Vec::new();
    let mut product_ids = Vec::new();
    if let Some(items) = object
        .get("items")
        .and_then(|i| i.get("data"))
        .and_then(Value::as_array)
    {
        for item in items {
            if let Some(price) = string_at(item, &["price", "id"]) {
                price_ids.push(price);
            }
            if let Some(product) = string_at(item, &["price", "product"]) {
                product_ids.push(product);
            }
        }
    }
    (price_ids, product_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn config_with_store(path: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::new(
            "sqlite::memory:".into(),
            "an_extremely_long_testing_jwt_secret_value_0123456789_abcdefghijklmnop".into(),
            3600,
            "127.0.0.1".into(),
            0,
            "development".into(),
        );
        config.billing_store_path = path.to_string_lossy().into_owned();
        config
    }

    fn service(path: &std::path::Path) -> Arc<BillingService> {
        let (tx, _rx) = mpsc::channel(64);
        BillingService::new(&config_with_store(path), EventSender::new(tx)).unwrap()
    }

    #[tokio::test]
    async fn unknown_company_defaults_to_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir.path().join("billing.json"));
        let record = svc.subscription_status("co-1").await.unwrap();
        assert!(!record.active);
        assert_eq!(record.status, "inactive");
    }

    #[tokio::test]
    async fn checkout_completion_activates_company() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir.path().join("billing.json"));

        let object = json!({
            "client_reference_id": "co-1",
            "customer": "cus_123"
        });
        svc.apply_provider_event("checkout.session.completed", &object)
            .await
            .unwrap();

        let record = svc.subscription_status("co-1").await.unwrap();
        assert!(record.active);
        assert_eq!(record.status, "active");
        assert_eq!(record.customer_id.as_deref(), Some("cus_123"));
    }

    #[tokio::test]
    async fn subscription_update_tracks_items_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir.path().join("billing.json"));

        let object = json!({
            "metadata": {"companyId": "co-2"},
            "status": "trialing",
            "customer": "cus_9",
            "items": {"data": [
                {"price": {"id": "price_a", "product": "prod_a"}},
                {"price": {"id": "price_b", "product": "prod_b"}}
            ]}
        });
        svc.apply_provider_event("customer.subscription.updated", &object)
            .await
            .unwrap();

        let record = svc.subscription_status("co-2").await.unwrap();
        assert!(record.active);
        assert_eq!(record.status, "trialing");
        assert_eq!(record.price_id.as_deref(), Some("price_a"));
        assert_eq!(record.active_price_ids, vec!["price_a", "price_b"]);
        assert_eq!(record.active_product_ids, vec!["prod_a", "prod_b"]);
    }

    #[tokio::test]
    async fn subscription_deletion_deactivates() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir.path().join("billing.json"));

        svc.apply_provider_event(
            "checkout.session.completed",
            &json!({"client_reference_id": "co-3"}),
        )
        .await
        .unwrap();
        svc.apply_provider_event(
            "customer.subscription.deleted",
            &json!({"metadata": {"companyId": "co-3"}}),
        )
        .await
        .unwrap();

        let record = svc.subscription_status("co-3").await.unwrap();
        assert!(!record.active);
        assert_eq!(record.status, "canceled");
    }

    #[tokio::test]
    async fn failed_payment_marks_past_due() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir.path().join("billing.json"));

        svc.apply_provider_event(
            "invoice.payment_failed",
            &json!({"subscription_details": {"metadata": {"companyId": "co-4"}}}),
        )
        .await
        .unwrap();

        let record = svc.subscription_status("co-4").await.unwrap();
        assert!(!record.active);
        assert_eq!(record.status, "past_due");
    }

    #[tokio::test]
    async fn events_without_company_id_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir.path().join("billing.json"));
        svc.apply_provider_event("invoice.payment_succeeded", &json!({}))
            .await
            .unwrap();
        assert!(!svc.is_active("anything").await.unwrap());
    }

    #[tokio::test]
    async fn store_survives_service_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("billing.json");

        let svc = service(&path);
        svc.apply_provider_event(
            "checkout.session.completed",
            &json!({"client_reference_id": "co-5"}),
        )
        .await
        .unwrap();
        drop(svc);

        let reopened = service(&path);
        assert!(reopened.is_active("co-5").await.unwrap());
    }

    #[test]
    fn signature_round_trip_verifies() {
        let payload = br#"{"type":"invoice.payment_succeeded"}"#;
        let header = sign_webhook_payload(payload, "whsec_test", Utc::now().timestamp());
        assert!(verify_webhook_signature(payload, &header, "whsec_test", Some(300)).is_ok());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let header = sign_webhook_payload(b"original", "whsec_test", Utc::now().timestamp());
        let err = verify_webhook_signature(b"tampered", &header, "whsec_test", Some(300))
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let header = sign_webhook_payload(b"payload", "whsec_a", Utc::now().timestamp());
        assert!(verify_webhook_signature(b"payload", &header, "whsec_b", Some(300)).is_err());
    }

    #[test]
    fn stale_timestamp_rejected() {
        let header = sign_webhook_payload(b"payload", "whsec_test", Utc::now().timestamp() - 4000);
        assert!(verify_webhook_signature(b"payload", &header, "whsec_test", Some(300)).is_err());
    }

    #[tokio::test]
    async fn checkout_without_secret_key_reports_misconfiguration() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir.path().join("billing.json"));
        let request = CheckoutRequest {
            company_id: "co-1".into(),
            ..Default::default()
        };
        let err = svc.create_checkout_session(&request).await.unwrap_err();
        assert!(matches!(err, ServiceError::MissingConfiguration(_)));
    }

    #[tokio::test]
    async fn checkout_form_prefers_request_fields_over_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_store(&dir.path().join("billing.json"));
        config.stripe_price_id = Some("price_default".into());
        config.checkout_success_url = Some("https://app.example/ok".into());
        config.checkout_cancel_url = Some("https://app.example/cancel".into());
        let (tx, _rx) = mpsc::channel(64);
        let svc = BillingService::new(&config, EventSender::new(tx)).unwrap();

        let request = CheckoutRequest {
            company_id: "co-1".into(),
            price_id: Some("price_custom".into()),
            customer_email: Some("billing@alfa.test".into()),
            success_url: Some("https://alfa.test/ok".into()),
            cancel_url: Some("https://alfa.test/cancel".into()),
        };
        let form = svc.checkout_form(&request).unwrap();
        let get = |k: &str| {
            form.iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("line_items[0][price]"), Some("price_custom"));
        assert_eq!(get("success_url"), Some("https://alfa.test/ok"));
        assert_eq!(get("cancel_url"), Some("https://alfa.test/cancel"));
        assert_eq!(get("customer_email"), Some("billing@alfa.test"));
        assert_eq!(get("client_reference_id"), Some("co-1"));

        // Absent request fields fall back to the configured defaults and
        // the optional email is simply omitted
        let fallback = svc
            .checkout_form(&CheckoutRequest {
                company_id: "co-1".into(),
                ..Default::default()
            })
            .unwrap();
        let get = |k: &str| {
            fallback
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("line_items[0][price]"), Some("price_default"));
        assert_eq!(get("success_url"), Some("https://app.example/ok"));
        assert_eq!(get("customer_email"), None);
    }

    #[tokio::test]
    async fn checkout_form_without_any_redirect_urls_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with_store(&dir.path().join("billing.json"));
        config.stripe_price_id = Some("price_default".into());
        let (tx, _rx) = mpsc::channel(64);
        let svc = BillingService::new(&config, EventSender::new(tx)).unwrap();

        let err = svc
            .checkout_form(&CheckoutRequest {
                company_id: "co-1".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::MissingConfiguration(_)));
    }

    #[tokio::test]
    async fn store_health_flags_unreadable_store() {
        let dir = tempfile::tempdir().unwrap();

        // Missing file reads as an empty store
        let svc = service(&dir.path().join("billing.json"));
        svc.store_health().await.unwrap();

        // A path that cannot be read as a file is reported
        let broken = service(dir.path());
        assert!(broken.store_health().await.is_err());
    }
}
