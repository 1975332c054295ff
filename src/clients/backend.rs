//! Client for the product backend's REST API.
//!
//! One client implements all four collaborator traits. Responses are decoded
//! through private wire types because the backend speaks numeric ids and
//! zone-less timestamps.
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{
    BlacklistEntry, BlockedWord, BlockedWordUpdate, CommentId, CommentRecord, CrawlReport,
    ModerationJobRequest, NewBlacklistEntry, NewBlockedWord, Platform, Scope, Severity,
    VerdictFilter, WordCategory,
};
use crate::moderation::normalize::platform_for_url;
use crate::store::{
    BatchDeleteReport, BlacklistStore, BlockedWordStore, CommentStore, CrawlAnalyzer,
    ProgressSink,
};
use crate::util::time::resolve_publish_date;

const PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    /// Sent as a bearer token when present.
    pub service_token: Option<String>,
    /// Account the crawl is attributed to.
    pub user_id: i64,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: Url,
    service_token: Option<String>,
    user_id: i64,
}

impl BackendClient {
    /// # Errors
    /// Fails when the base URL does not parse or the HTTP client cannot be built.
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build backend HTTP client")?;

        // `Url::join` drops the last path segment unless it ends with a slash.
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("invalid backend base URL")?;

        Ok(Self {
            client,
            base_url,
            service_token: config.service_token.filter(|t| !t.trim().is_empty()),
            user_id: config.user_id,
        })
    }

    /// Readiness probe: lists the blocked words and discards them.
    ///
    /// # Errors
    /// Fails when the backend is unreachable or answers with an error status.
    pub async fn ping(&self) -> Result<()> {
        let url = self.endpoint("api/blocked-words")?;
        self.send(self.request(Method::GET, url), "ping").await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("failed to build backend URL for {path}"))
    }

    /// `collection` with `id` appended as one escaped path segment.
    fn resource(&self, collection: &str, id: &str) -> Result<Url> {
        let mut url = self.endpoint(collection)?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("backend base URL cannot carry a path"))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.service_token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, operation: &str) -> Result<Response> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("backend {operation} request failed"))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("backend {operation} returned error status {status}: {error_body}");
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        operation: &str,
    ) -> Result<T> {
        self.send(builder, operation)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("failed to deserialize backend {operation} response"))
    }

    async fn fetch_comment_page(&self, scope: &Scope, page: u32) -> Result<CommentPage> {
        let mut url = self.endpoint("api/comments")?;
        {
            let mut query_pairs = url.query_pairs_mut();
            if let Some(target) = scope.url.as_deref() {
                query_pairs.append_pair("url", target);
            }
            if let Some(range) = &scope.date_range {
                query_pairs.append_pair("startDate", &range.start.to_string());
                query_pairs.append_pair("endDate", &range.end.to_string());
            }
            match scope.verdict {
                VerdictFilter::All => {}
                VerdictFilter::Clean => {
                    query_pairs.append_pair("status", "clean");
                }
                VerdictFilter::Malicious => {
                    query_pairs.append_pair("status", "malicious");
                }
            }
            query_pairs.append_pair("page", &page.to_string());
            query_pairs.append_pair("size", &PAGE_SIZE.to_string());
        }

        self.send_json(self.request(Method::GET, url), "comments.list")
            .await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlBody<'a> {
    url: &'a str,
    user_id: i64,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

/// The backend keys rows by numeric id; memory stores use strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Number(n) => n.to_string(),
            WireId::Text(s) => s,
        }
    }
}

fn id_value(comment_id: &str) -> Value {
    comment_id
        .parse::<i64>()
        .map_or_else(|_| Value::String(comment_id.to_string()), Value::from)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireComment {
    comment_id: WireId,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    author_identifier: Option<String>,
    #[serde(default)]
    platform: Option<Platform>,
    #[serde(default, alias = "text")]
    content: Option<String>,
    #[serde(default)]
    is_malicious: Option<bool>,
    #[serde(default)]
    toxicity_score: Option<f64>,
    #[serde(default)]
    commented_at: Option<String>,
    #[serde(default, alias = "sourceUrl")]
    content_url: Option<String>,
}

impl WireComment {
    fn into_record(self, fallback_url: Option<&str>, now: DateTime<Utc>) -> CommentRecord {
        let source_url = self
            .content_url
            .or_else(|| fallback_url.map(str::to_string))
            .unwrap_or_default();
        let author_name = self.author_name.unwrap_or_default();
        CommentRecord {
            comment_id: self.comment_id.into_string(),
            author_identifier: self
                .author_identifier
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| author_name.clone()),
            author_name,
            platform: self
                .platform
                .unwrap_or_else(|| platform_for_url(&source_url)),
            text: self.content.unwrap_or_default(),
            is_malicious: self.is_malicious.unwrap_or(false),
            toxicity_score: self.toxicity_score.unwrap_or(0.0).clamp(0.0, 1.0),
            contains_blocked_word: false,
            matched_blocked_word_id: None,
            is_blacklisted: false,
            commented_at: resolve_publish_date(self.commented_at.as_deref(), now),
            source_url,
        }
    }
}

/// Spring `Page` envelope; only the fields the client walks.
#[derive(Debug, Deserialize)]
struct CommentPage {
    #[serde(default)]
    content: Vec<WireComment>,
    #[serde(default = "last_page")]
    last: bool,
}

fn last_page() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
struct DeleteAllResponse {
    #[serde(default)]
    deleted: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlacklistEntry {
    blacklist_id: i64,
    #[serde(default, alias = "authorName")]
    blocked_author_name: Option<String>,
    #[serde(alias = "authorIdentifier")]
    blocked_author_identifier: String,
    #[serde(default)]
    platform: Option<Platform>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    comment_text: Option<String>,
    #[serde(default)]
    violation_count: Option<u32>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl WireBlacklistEntry {
    fn into_entry(self, now: DateTime<Utc>) -> BlacklistEntry {
        BlacklistEntry {
            blacklist_id: self.blacklist_id,
            author_name: self
                .blocked_author_name
                .unwrap_or_else(|| self.blocked_author_identifier.clone()),
            author_identifier: self.blocked_author_identifier,
            platform: self.platform.unwrap_or_default(),
            reason: self.reason.unwrap_or_default(),
            violation_count: self.violation_count.unwrap_or(1),
            comment_text: self.comment_text,
            created_at: resolve_publish_date(self.created_at.as_deref(), now),
            updated_at: self
                .updated_at
                .as_deref()
                .map(|raw| resolve_publish_date(Some(raw), now)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlockedWord {
    word_id: i64,
    word: String,
    #[serde(default)]
    category: Option<WordCategory>,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl WireBlockedWord {
    fn into_word(self, now: DateTime<Utc>) -> BlockedWord {
        BlockedWord {
            word_id: self.word_id,
            word: self.word,
            category: self.category.unwrap_or_default(),
            severity: self.severity.unwrap_or_default(),
            is_active: self.is_active.unwrap_or(true),
            created_at: resolve_publish_date(self.created_at.as_deref(), now),
            updated_at: self
                .updated_at
                .as_deref()
                .map(|raw| resolve_publish_date(Some(raw), now)),
        }
    }
}

#[async_trait]
impl CrawlAnalyzer for BackendClient {
    async fn crawl_and_analyze(
        &self,
        request: &ModerationJobRequest,
        progress: &dyn ProgressSink,
    ) -> Result<CrawlReport> {
        let url = self.endpoint("api/comments/crawl")?;
        let body = CrawlBody {
            url: request.target_url.trim(),
            user_id: self.user_id,
            start_date: request.start_date,
            end_date: request.end_date,
        };

        progress.report("crawling");
        let report: CrawlReport = self
            .send_json(self.request(Method::POST, url).json(&body), "comments.crawl")
            .await?;
        progress.report("analyzed");
        debug!(
            total = report.total_crawled,
            records = report.records.len(),
            "crawl report received"
        );
        Ok(report)
    }
}

#[async_trait]
impl CommentStore for BackendClient {
    async fn list(&self, scope: &Scope) -> Result<Vec<CommentRecord>> {
        let now = Utc::now();
        let mut records = Vec::new();
        let mut page = 0;

        loop {
            let batch = self.fetch_comment_page(scope, page).await?;
            let count = batch.content.len();
            records.extend(
                batch
                    .content
                    .into_iter()
                    .map(|c| c.into_record(scope.url.as_deref(), now)),
            );
            debug!(page, comments = count, total = records.len(), "fetched comments page");

            if batch.last || count == 0 {
                break;
            }
            page += 1;
        }

        Ok(records)
    }

    async fn delete(&self, comment_id: &str) -> Result<()> {
        let url = self.resource("api/comments", comment_id)?;
        self.send(self.request(Method::DELETE, url), "comments.delete")
            .await?;
        Ok(())
    }

    async fn delete_batch(&self, comment_ids: &[CommentId]) -> Result<BatchDeleteReport> {
        let url = self.endpoint("api/comments/delete-batch")?;
        let body: Vec<Value> = comment_ids.iter().map(|id| id_value(id)).collect();
        let text = self
            .send(self.request(Method::POST, url).json(&body), "comments.delete_batch")
            .await?
            .text()
            .await
            .context("failed to read backend comments.delete_batch response")?;

        // A plain acknowledgement confirms the whole batch.
        Ok(serde_json::from_str::<BatchDeleteReport>(&text).unwrap_or_else(|_| {
            BatchDeleteReport {
                deleted: comment_ids.to_vec(),
                failed: Vec::new(),
            }
        }))
    }

    async fn delete_all(&self, scope: &Scope) -> Result<u64> {
        if scope.date_range.is_some() || scope.verdict != VerdictFilter::All {
            anyhow::bail!("backend delete-all only supports a url scope");
        }
        let mut url = self.endpoint("api/comments/delete-all")?;
        if let Some(target) = scope.url.as_deref() {
            url.query_pairs_mut().append_pair("url", target);
        }

        let response: DeleteAllResponse = self
            .send_json(self.request(Method::DELETE, url), "comments.delete_all")
            .await?;
        if response.deleted.is_none() {
            warn!("backend did not report a delete-all count");
        }
        Ok(response.deleted.unwrap_or(0))
    }
}

#[async_trait]
impl BlacklistStore for BackendClient {
    async fn list(&self) -> Result<Vec<BlacklistEntry>> {
        let url = self.endpoint("api/blacklist")?;
        let entries: Vec<WireBlacklistEntry> = self
            .send_json(self.request(Method::GET, url), "blacklist.list")
            .await?;
        let now = Utc::now();
        Ok(entries.into_iter().map(|e| e.into_entry(now)).collect())
    }

    async fn add(&self, entry: NewBlacklistEntry) -> Result<BlacklistEntry> {
        let url = self.endpoint("api/blacklist")?;
        let saved: WireBlacklistEntry = self
            .send_json(self.request(Method::POST, url).json(&entry), "blacklist.add")
            .await?;
        Ok(saved.into_entry(Utc::now()))
    }

    async fn remove(&self, blacklist_id: i64) -> Result<()> {
        let url = self.endpoint(&format!("api/blacklist/{blacklist_id}"))?;
        self.send(self.request(Method::DELETE, url), "blacklist.remove")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BlockedWordStore for BackendClient {
    async fn list(&self) -> Result<Vec<BlockedWord>> {
        let url = self.endpoint("api/blocked-words")?;
        let words: Vec<WireBlockedWord> = self
            .send_json(self.request(Method::GET, url), "blocked_words.list")
            .await?;
        let now = Utc::now();
        Ok(words.into_iter().map(|w| w.into_word(now)).collect())
    }

    async fn add(&self, word: NewBlockedWord) -> Result<BlockedWord> {
        let url = self.endpoint("api/blocked-words")?;
        let saved: WireBlockedWord = self
            .send_json(self.request(Method::POST, url).json(&word), "blocked_words.add")
            .await?;
        Ok(saved.into_word(Utc::now()))
    }

    async fn update(&self, word_id: i64, update: BlockedWordUpdate) -> Result<BlockedWord> {
        let url = self.endpoint(&format!("api/blocked-words/{word_id}"))?;
        let saved: WireBlockedWord = self
            .send_json(
                self.request(Method::PUT, url).json(&update),
                "blocked_words.update",
            )
            .await?;
        Ok(saved.into_word(Utc::now()))
    }

    async fn remove(&self, word_id: i64) -> Result<()> {
        let url = self.endpoint(&format!("api/blocked-words/{word_id}"))?;
        self.send(self.request(Method::DELETE, url), "blocked_words.remove")
            .await?;
        Ok(())
    }

    async fn toggle(&self, word_id: i64) -> Result<BlockedWord> {
        let url = self.endpoint(&format!("api/blocked-words/{word_id}/toggle"))?;
        let saved: WireBlockedWord = self
            .send_json(self.request(Method::PATCH, url), "blocked_words.toggle")
            .await?;
        Ok(saved.into_word(Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> BackendConfig {
        BackendConfig {
            base_url,
            service_token: Some("secret".into()),
            user_id: 7,
            connect_timeout: Duration::from_secs(3),
            total_timeout: Duration::from_secs(30),
        }
    }

    #[derive(Default)]
    struct Stages(Mutex<Vec<String>>);

    impl ProgressSink for Stages {
        fn report(&self, stage: &str) {
            self.0.lock().unwrap().push(stage.to_string());
        }
    }

    #[tokio::test]
    async fn ping_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/blocked-words"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = BackendClient::new(test_config(server.uri())).expect("client should build");
        client.ping().await.expect("ping should succeed");
    }

    #[tokio::test]
    async fn crawl_posts_request_and_reports_progress() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/comments/crawl"))
            .and(body_json(serde_json::json!({
                "url": "https://youtu.be/v1",
                "userId": 7,
                "startDate": "2024-01-01",
                "endDate": "2024-01-04"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalCrawled": 2,
                "analyzedCount": 2,
                "comments": [
                    {"externalId": "a", "authorName": "kim", "text": "hi", "isMalicious": false},
                    {"externalId": "b", "authorName": "lee", "text": "bad", "isMalicious": true, "toxicityScore": 0.9}
                ]
            })))
            .mount(&server)
            .await;

        let client = BackendClient::new(test_config(server.uri())).expect("client should build");
        let request = ModerationJobRequest::new(
            " https://youtu.be/v1 ",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
        );
        let stages = Stages::default();
        let report = client
            .crawl_and_analyze(&request, &stages)
            .await
            .expect("crawl should succeed");

        assert_eq!(report.total_crawled, 2);
        assert_eq!(report.records.len(), 2);
        assert!(report.records[1].is_malicious);
        assert_eq!(*stages.0.lock().unwrap(), vec!["crawling", "analyzed"]);
    }

    #[tokio::test]
    async fn delete_escapes_the_comment_id() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/comments/..%2Fblacklist%2F3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::new(test_config(server.uri())).expect("client should build");
        client
            .delete("../blacklist/3")
            .await
            .expect("delete should hit the comment resource");
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/comments/crawl"))
            .respond_with(ResponseTemplate::new(400).set_body_string("URL is required"))
            .mount(&server)
            .await;

        let client = BackendClient::new(test_config(server.uri())).expect("client should build");
        let request = ModerationJobRequest::new(
            "v1",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );
        let error = client
            .crawl_and_analyze(&request, &Stages::default())
            .await
            .unwrap_err();

        let message = format!("{error:#}");
        assert!(message.contains("400"), "{message}");
        assert!(message.contains("URL is required"), "{message}");
    }

    #[tokio::test]
    async fn list_walks_pages_and_maps_wire_comments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/comments"))
            .and(query_param("url", "https://youtu.be/v1"))
            .and(query_param("status", "malicious"))
            .and(query_param("page", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{
                    "commentId": 11,
                    "authorName": "kim",
                    "content": "spam",
                    "isMalicious": true,
                    "commentedAt": "2024-01-02T03:04:05",
                    "contentUrl": "https://youtu.be/v1"
                }],
                "last": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/comments"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"commentId": "12", "authorName": "lee", "authorIdentifier": "@lee"}],
                "last": true
            })))
            .mount(&server)
            .await;

        let client = BackendClient::new(test_config(server.uri())).expect("client should build");
        let scope = Scope::for_url("https://youtu.be/v1").with_verdict(VerdictFilter::Malicious);
        let records = CommentStore::list(&client, &scope)
            .await
            .expect("list should succeed");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].comment_id, "11");
        assert_eq!(records[0].author_identifier, "kim");
        assert_eq!(records[0].platform, Platform::Youtube);
        assert_eq!(records[0].commented_at.to_rfc3339(), "2024-01-02T03:04:05+00:00");
        assert_eq!(records[1].comment_id, "12");
        assert_eq!(records[1].author_identifier, "@lee");
        assert_eq!(records[1].source_url, "https://youtu.be/v1");
    }

    #[tokio::test]
    async fn delete_batch_sends_numeric_ids_and_accepts_plain_ack() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/comments/delete-batch"))
            .and(body_json(serde_json::json!([1, 2])))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message": "Deleted 2 comments successfully"})),
            )
            .mount(&server)
            .await;

        let client = BackendClient::new(test_config(server.uri())).expect("client should build");
        let report = client
            .delete_batch(&["1".to_string(), "2".to_string()])
            .await
            .expect("delete should succeed");

        assert_eq!(report.deleted, vec!["1".to_string(), "2".to_string()]);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn delete_all_rejects_scopes_the_backend_cannot_express() {
        let client = BackendClient::new(test_config("http://127.0.0.1:9".into()))
            .expect("client should build");
        let scope = Scope::for_url("v1").with_verdict(VerdictFilter::Clean);
        assert!(client.delete_all(&scope).await.is_err());
    }

    #[tokio::test]
    async fn blacklist_list_maps_backend_field_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/blacklist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "blacklistId": 3,
                "blockedAuthorName": "kim",
                "blockedAuthorIdentifier": "@kim",
                "platform": "YOUTUBE",
                "reason": "spam",
                "violationCount": 2,
                "createdAt": "2024-01-02T03:04:05"
            }])))
            .mount(&server)
            .await;

        let client = BackendClient::new(test_config(server.uri())).expect("client should build");
        let entries = BlacklistStore::list(&client).await.expect("list should succeed");

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].author_identifier, "@kim");
        assert_eq!(entries[0].violation_count, 2);
    }

    #[tokio::test]
    async fn toggle_patches_word() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/blocked-words/5/toggle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "wordId": 5,
                "word": "scam",
                "category": "SPAM",
                "severity": "HIGH",
                "isActive": false
            })))
            .mount(&server)
            .await;

        let client = BackendClient::new(test_config(format!("{}/", server.uri())))
            .expect("client should build");
        let word = client.toggle(5).await.expect("toggle should succeed");

        assert!(!word.is_active);
        assert_eq!(word.category, WordCategory::Spam);
        assert_eq!(word.severity, Severity::High);
    }
}
