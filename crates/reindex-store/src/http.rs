//! Elasticsearch REST implementation of [`DocumentStore`].

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};

use reindex_types::{Document, StoreSettings, VersionToken};

use crate::error::StoreError;
use crate::store::DocumentStore;
use crate::types::{
    AliasActions, BulkResponse, Cursor, ItemOutcome, ScanFilter, ScanPage, WriteRequest,
};

/// Type used in URLs when a document has none.
const FALLBACK_TYPE: &str = "_doc";

/// Configuration for the HTTP store client.
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Cluster base URL (e.g., "http://localhost:9200")
    pub base_url: String,

    /// Basic-auth user
    pub username: Option<String>,

    /// Basic-auth password
    pub password: Option<SecretString>,

    /// Request timeout
    pub timeout: Duration,

    /// Attempts for idempotent reads
    pub max_retries: u32,
}

impl HttpStoreConfig {
    /// Unauthenticated config for a base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self {
            username: settings.username.clone(),
            password: settings.password.clone(),
            timeout: settings.timeout(),
            max_retries: settings.max_retries,
            ..Self::new(settings.url.clone())
        }
    }
}

/// Document store client speaking the Elasticsearch REST API.
pub struct HttpStore {
    client: Client,
    config: HttpStoreConfig,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    #[serde(default)]
    total: Option<Total>,
    #[serde(default)]
    hits: Vec<Hit>,
}

/// `hits.total` is a number before 7.x and an object after.
#[derive(Deserialize)]
#[serde(untagged)]
enum Total {
    Count(u64),
    Object { value: u64 },
}

impl Total {
    fn value(&self) -> u64 {
        match self {
            Total::Count(n) | Total::Object { value: n } => *n,
        }
    }
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_type", default)]
    doc_type: String,
    #[serde(rename = "_version", default)]
    version: Option<Value>,
    #[serde(rename = "_source", default)]
    source: Value,
}

impl Hit {
    fn into_document(self) -> Document {
        let version = match self.version {
            Some(Value::Number(n)) => VersionToken::new(n.to_string()),
            Some(Value::String(s)) => VersionToken::new(s),
            _ => VersionToken::new(""),
        };
        Document {
            id: self.id,
            doc_type: self.doc_type,
            version,
            source: self.source,
        }
    }
}

#[derive(Deserialize)]
struct BulkBody {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: String,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct AliasEntry {
    #[serde(default)]
    aliases: Map<String, Value>,
}

#[derive(Deserialize)]
struct Acknowledged {
    #[serde(default)]
    acknowledged: bool,
}

/// Pull `reason` out of an error object, or render it whole.
fn error_reason(error: &Value) -> String {
    error
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

/// Keep-alive in scroll syntax.
fn scroll_param(keep_alive: Duration) -> String {
    format!("{}s", keep_alive.as_secs().max(1))
}

impl HttpStore {
    /// Create a new HTTP store client.
    pub fn new(config: HttpStoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(user) => builder.basic_auth(
                user,
                self.config
                    .password
                    .as_ref()
                    .map(|p| p.expose_secret().to_string()),
            ),
            None => builder,
        }
    }

    /// Send a request and fail on non-success statuses.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = self.authorize(builder).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Run an idempotent request with retry on transient failures.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    if attempts >= self.config.max_retries.max(1) {
                        error!(request = what, error = %e, "Max retries exceeded");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                request = what,
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "Store request failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(request = what, error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    fn scan_page(&self, body: SearchResponse) -> Result<ScanPage, StoreError> {
        let cursor = body
            .scroll_id
            .filter(|id| !id.is_empty())
            .map(Cursor::new)
            .ok_or_else(|| StoreError::InvalidResponse("missing _scroll_id".to_string()))?;

        Ok(ScanPage {
            cursor: Some(cursor),
            total: body.hits.total.as_ref().map_or(0, Total::value),
            documents: body.hits.hits.into_iter().map(Hit::into_document).collect(),
        })
    }

    /// NDJSON body of a bulk request.
    fn bulk_body(requests: &[WriteRequest]) -> Result<String, StoreError> {
        let mut body = String::new();
        for request in requests {
            let mut meta = Map::new();
            meta.insert("_index".to_string(), json!(request.index));
            if !request.doc_type.is_empty() {
                meta.insert("_type".to_string(), json!(request.doc_type));
            }
            meta.insert("_id".to_string(), json!(request.id));
            if let Some(version) = &request.version {
                let value = version
                    .parse()
                    .map_or_else(|| json!(version.as_str()), |v| json!(v));
                meta.insert("version".to_string(), value);
                meta.insert("version_type".to_string(), json!("external_gte"));
            }
            if let Some(parent) = &request.parent {
                meta.insert("parent".to_string(), json!(parent));
            }

            body.push_str(&serde_json::to_string(&json!({ "index": meta }))?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&request.source)?);
            body.push('\n');
        }
        Ok(body)
    }
}

#[async_trait]
impl DocumentStore for HttpStore {
    async fn count(&self, index: &str) -> Result<u64, StoreError> {
        let url = self.url(&format!("{}/_count", index));
        let url = url.as_str();
        self.with_retry("count", move || async move {
            let response = self.send(self.client.get(url)).await?;
            let body: CountResponse = response.json().await?;
            Ok(body.count)
        })
        .await
        .map_err(|e| not_found_as_index(e, index))
    }

    async fn open_scan(
        &self,
        index: &str,
        filter: &ScanFilter,
        page_size: usize,
        keep_alive: Duration,
    ) -> Result<ScanPage, StoreError> {
        let request = self
            .client
            .post(self.url(&format!("{}/_search", index)))
            .query(&[("scroll", scroll_param(keep_alive))])
            .json(&json!({
                "size": page_size,
                "query": filter.to_query(),
                "sort": ["_doc"],
                "version": true,
            }));

        let response = self
            .send(request)
            .await
            .map_err(|e| not_found_as_index(e, index))?;
        let page = self.scan_page(response.json().await?)?;
        debug!(index, total = page.total, %filter, "Opened scroll");
        Ok(page)
    }

    async fn fetch(&self, cursor: &Cursor, keep_alive: Duration) -> Result<ScanPage, StoreError> {
        let request = self
            .client
            .post(self.url("_search/scroll"))
            .json(&json!({
                "scroll": scroll_param(keep_alive),
                "scroll_id": cursor.as_str(),
            }));

        let response = self.send(request).await.map_err(|e| match e {
            StoreError::Status { status: 404, .. } => StoreError::CursorExpired(cursor.to_string()),
            other => other,
        })?;
        self.scan_page(response.json().await?)
    }

    async fn clear_scan(&self, cursor: &Cursor) -> Result<(), StoreError> {
        let request = self
            .client
            .delete(self.url("_search/scroll"))
            .json(&json!({ "scroll_id": [cursor.as_str()] }));
        match self.send(request).await {
            Ok(_) | Err(StoreError::Status { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn bulk_write(&self, requests: &[WriteRequest]) -> Result<BulkResponse, StoreError> {
        if requests.is_empty() {
            return Ok(BulkResponse::default());
        }

        let request = self
            .client
            .post(self.url("_bulk"))
            .header("Content-Type", "application/x-ndjson")
            .body(Self::bulk_body(requests)?);

        let body: BulkBody = self.send(request).await?.json().await?;
        let items = body
            .items
            .into_iter()
            .map(|mut entry| {
                let item = entry.drain().map(|(_, item)| item).next();
                match item {
                    Some(BulkItem {
                        id,
                        status,
                        error: Some(error),
                    }) => ItemOutcome::failed(id, status, error_reason(&error)),
                    Some(BulkItem { id, status, .. }) => ItemOutcome::ok(id, status),
                    None => ItemOutcome::failed("", 0, "empty bulk item"),
                }
            })
            .collect::<Vec<_>>();

        if items.len() != requests.len() {
            return Err(StoreError::InvalidResponse(format!(
                "bulk returned {} items for {} requests",
                items.len(),
                requests.len()
            )));
        }

        Ok(BulkResponse {
            errors: body.errors,
            items,
        })
    }

    async fn write(&self, request: &WriteRequest) -> Result<ItemOutcome, StoreError> {
        let doc_type = if request.doc_type.is_empty() {
            FALLBACK_TYPE
        } else {
            request.doc_type.as_str()
        };
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(version) = &request.version {
            params.push(("version", version.to_string()));
            params.push(("version_type", "external_gte".to_string()));
        }
        if let Some(parent) = &request.parent {
            params.push(("parent", parent.clone()));
        }

        let builder = self
            .client
            .put(self.url(&format!("{}/{}/{}", request.index, doc_type, request.id)))
            .query(&params)
            .json(&request.source);

        match self.send(builder).await {
            Ok(response) => Ok(ItemOutcome::ok(&request.id, response.status().as_u16())),
            // 4xx is the store refusing this document, not a broken transport
            Err(StoreError::Status { status, body }) if (400..500).contains(&status) => {
                let reason = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| v.get("error").map(error_reason))
                    .unwrap_or(body);
                Ok(ItemOutcome::failed(&request.id, status, reason))
            }
            Err(e) => Err(e),
        }
    }

    async fn aliases(&self, index: &str) -> Result<BTreeSet<String>, StoreError> {
        let url = self.url(&format!("{}/_alias", index));
        let url = url.as_str();
        self.with_retry("aliases", move || async move {
            let response = self.send(self.client.get(url)).await?;
            let body: HashMap<String, AliasEntry> = response.json().await?;
            Ok(body
                .into_values()
                .flat_map(|entry| entry.aliases.into_iter().map(|(name, _)| name))
                .collect())
        })
        .await
        .map_err(|e| not_found_as_index(e, index))
    }

    async fn swap_aliases(&self, actions: &AliasActions) -> Result<(), StoreError> {
        let request = self.client.post(self.url("_aliases")).json(&actions.to_body());
        let body: Acknowledged = self.send(request).await?.json().await?;
        if !body.acknowledged {
            return Err(StoreError::InvalidResponse(
                "alias swap not acknowledged".to_string(),
            ));
        }
        Ok(())
    }

    async fn refresh(&self, index: &str) -> Result<(), StoreError> {
        let url = self.url(&format!("{}/_refresh", index));
        let url = url.as_str();
        self.with_retry("refresh", move || async move {
            self.send(self.client.post(url)).await?;
            Ok(())
        })
        .await
        .map_err(|e| not_found_as_index(e, index))
    }

    async fn delete_index(&self, index: &str) -> Result<(), StoreError> {
        let body: Acknowledged = self
            .send(self.client.delete(self.url(index)))
            .await
            .map_err(|e| not_found_as_index(e, index))?
            .json()
            .await?;
        if !body.acknowledged {
            return Err(StoreError::InvalidResponse(format!(
                "delete of {} not acknowledged",
                index
            )));
        }
        Ok(())
    }
}

fn not_found_as_index(err: StoreError, index: &str) -> StoreError {
    match err {
        StoreError::Status { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
            StoreError::IndexNotFound(index.to_string())
        }
        other => other,
    }
}
