// src/submit/platform.rs
//! Generation-platform seam plus the HTTP client for the workflow platform.
//!
//! A dispatch is three calls: fetch the workflow's input schema (cached),
//! initiate a job, execute it with the schema filled in. The call returns as
//! soon as the platform accepts the job; progress is never polled.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::errors::DispatchError;
use crate::model::{Category, ContentItem, ItemId};

/// Sent in place of a missing publish date; the workflow rejects empty inputs.
pub const MISSING_DATE_SENTINEL: &str = "N/A";

const SUMMARY_FALLBACK_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchPayload {
    pub item_id: ItemId,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub keywords: Vec<String>,
    pub category: Category,
    pub source_name: String,
    pub url: String,
    pub relevance_score: f64,
    /// RFC 3339, or `MISSING_DATE_SENTINEL`.
    pub published: String,
}

impl DispatchPayload {
    pub fn from_item(item: &ContentItem) -> Self {
        let summary = if item.summary.trim().is_empty() {
            item.body.chars().take(SUMMARY_FALLBACK_CHARS).collect()
        } else {
            item.summary.clone()
        };
        Self {
            item_id: item.id,
            title: item.title.clone(),
            summary,
            body: item.body.clone(),
            keywords: item.keywords.clone(),
            category: item.category.unwrap_or(Category::IndustryNews),
            source_name: item.source_name.clone(),
            url: item.url.clone(),
            relevance_score: item.relevance_score.unwrap_or(0.0),
            published: item
                .published_at
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| MISSING_DATE_SENTINEL.to_string()),
        }
    }

    pub fn job_title(&self) -> String {
        let short: String = self.title.chars().take(50).collect();
        format!("Generate {} post: {}", self.category, short)
    }

    pub fn job_description(&self) -> String {
        format!("Generate social media content from: {}", self.url)
    }
}

#[async_trait::async_trait]
pub trait GenerationPlatform: Send + Sync {
    /// Hand one payload to the platform. Returns the external job id.
    async fn dispatch(&self, payload: &DispatchPayload) -> Result<String, DispatchError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub base_url: String,
    pub workflow_id: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub timeout_secs: u64,
    /// Attempts for the idempotent schema fetch.
    pub max_retries: u8,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://operator.opus.com".to_string(),
            workflow_id: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl PlatformConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.workflow_id.is_empty()
    }
}

/// One input variable of the workflow schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaVar {
    pub key: String,
    pub variable_name: String,
    pub display_name: String,
    pub var_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Published,
    Url,
    Title,
    Keywords,
    Source,
    Category,
    Summary,
    Body,
}

/// First rule whose pattern occurs in a variable's name wins; order matters
/// ("content source" must resolve before the body's "content").
const FIELD_RULES: &[(Field, &[&str])] = &[
    (Field::Published, &["publish"]),
    (Field::Url, &["url", "link"]),
    (Field::Title, &["title"]),
    (Field::Keywords, &["keyword"]),
    (Field::Source, &["source"]),
    (Field::Category, &["category", "content type"]),
    (Field::Summary, &["summary"]),
    (Field::Body, &["raw", "content", "text", "body", "article"]),
];

fn normalize_name(s: &str) -> String {
    s.to_lowercase().replace(['_', '-'], " ")
}

fn field_for(var: &SchemaVar) -> Option<Field> {
    let names = [normalize_name(&var.display_name), normalize_name(&var.variable_name)];
    FIELD_RULES
        .iter()
        .find(|(_, pats)| pats.iter().any(|p| names.iter().any(|n| n.contains(p))))
        .map(|(f, _)| *f)
}

fn field_value(field: Field, p: &DispatchPayload) -> String {
    match field {
        Field::Published => p.published.clone(),
        Field::Url => p.url.clone(),
        Field::Title => p.title.clone(),
        Field::Keywords => p.keywords.join(", "),
        Field::Source => p.source_name.clone(),
        Field::Category => p.category.to_string(),
        Field::Summary => p.summary.clone(),
        Field::Body => p.body.clone(),
    }
}

/// Parse `jobPayloadSchema` out of a workflow document.
pub fn parse_schema(workflow: &Value) -> Result<Vec<SchemaVar>, DispatchError> {
    let obj = workflow
        .get("jobPayloadSchema")
        .and_then(Value::as_object)
        .ok_or_else(|| DispatchError::Mapping("workflow has no jobPayloadSchema".into()))?;
    let str_of = |v: &Value, k: &str| v.get(k).and_then(Value::as_str).unwrap_or("").to_string();
    Ok(obj
        .iter()
        .map(|(key, v)| SchemaVar {
            key: key.clone(),
            variable_name: str_of(v, "variable_name"),
            display_name: str_of(v, "display_name"),
            var_type: v
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("str")
                .to_string(),
        })
        .collect())
}

/// Fill the schema from the payload. The body must land somewhere.
pub fn build_instance(
    schema: &[SchemaVar],
    payload: &DispatchPayload,
) -> Result<Map<String, Value>, DispatchError> {
    let mut out = Map::new();
    let mut body_mapped = false;
    for var in schema {
        match field_for(var) {
            Some(field) => {
                body_mapped |= field == Field::Body;
                out.insert(
                    var.key.clone(),
                    json!({ "value": field_value(field, payload), "type": var.var_type }),
                );
            }
            None => debug!(target: "platform", var = %var.key, "unmapped workflow input"),
        }
    }
    if !body_mapped {
        return Err(DispatchError::Mapping(
            "no workflow input accepts the article body".into(),
        ));
    }
    Ok(out)
}

pub struct HttpPlatformClient {
    cfg: PlatformConfig,
    client: Client,
    schema: OnceCell<Vec<SchemaVar>>,
}

impl HttpPlatformClient {
    pub fn new(cfg: PlatformConfig) -> Self {
        Self {
            cfg,
            client: Client::new(),
            schema: OnceCell::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.cfg.timeout_secs.max(1))
    }

    async fn read_json(rsp: reqwest::Response) -> Result<Value, DispatchError> {
        let status = rsp.status();
        let text = rsp.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| {
                    v.get("message")
                        .or_else(|| v.get("error"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or(text);
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&text).map_err(|e| DispatchError::Mapping(format!("bad json: {e}")))
    }

    async fn fetch_schema(&self) -> Result<Vec<SchemaVar>, DispatchError> {
        let url = self.url(&format!("/workflow/{}", self.cfg.workflow_id));
        let max = self.cfg.max_retries.max(1);
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .get(&url)
                .header("x-service-key", &self.cfg.api_key)
                .timeout(self.timeout())
                .send()
                .await;
            let out = match res {
                Ok(rsp) => Self::read_json(rsp).await,
                Err(e) => Err(DispatchError::Http(e)),
            };
            match out {
                Ok(doc) => {
                    let schema = parse_schema(&doc)?;
                    info!(
                        target: "platform",
                        workflow = %self.cfg.workflow_id,
                        inputs = schema.len(),
                        "workflow schema cached"
                    );
                    return Ok(schema);
                }
                Err(e) if attempt < max => {
                    warn!(target: "platform", attempt, error = %e, "schema fetch failed; retrying");
                    tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn schema(&self) -> Result<&[SchemaVar], DispatchError> {
        self.schema
            .get_or_try_init(|| self.fetch_schema())
            .await
            .map(Vec::as_slice)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, DispatchError> {
        let rsp = self
            .client
            .post(self.url(path))
            .header("x-service-key", &self.cfg.api_key)
            .timeout(self.timeout())
            .json(body)
            .send()
            .await?;
        Self::read_json(rsp).await
    }
}

#[async_trait::async_trait]
impl GenerationPlatform for HttpPlatformClient {
    async fn dispatch(&self, payload: &DispatchPayload) -> Result<String, DispatchError> {
        // Map before initiating so a bad schema never leaves an orphan job.
        let instance = build_instance(self.schema().await?, payload)?;

        let initiated = self
            .post(
                "/job/initiate",
                &json!({
                    "workflowId": self.cfg.workflow_id,
                    "title": payload.job_title(),
                    "description": payload.job_description(),
                }),
            )
            .await?;
        let job_id = initiated
            .get("jobExecutionId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(DispatchError::MissingJobId)?
            .to_string();

        let executed = self
            .post(
                "/job/execute",
                &json!({
                    "jobExecutionId": job_id,
                    "jobPayloadSchemaInstance": instance,
                }),
            )
            .await
            .map_err(|e| DispatchError::Execute {
                job_id: job_id.clone(),
                source: Box::new(e),
            })?;
        if executed.get("success").and_then(Value::as_bool) != Some(true) {
            debug!(target: "platform", %job_id, response = %executed, "execute response without success flag");
        }
        Ok(job_id)
    }

    fn name(&self) -> &'static str {
        "http-platform"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubmissionStatus;
    use chrono::{TimeZone, Utc};

    fn item() -> ContentItem {
        ContentItem {
            id: 7,
            url: "https://blog.example.com/post".into(),
            title: "A".repeat(80),
            body: "b".repeat(900),
            summary: String::new(),
            keywords: vec!["ai".into(), "rpa".into()],
            author: None,
            published_at: None,
            source_id: 1,
            source_name: "Blog".into(),
            fingerprint: "f".into(),
            relevance_score: Some(0.82),
            category: Some(Category::CaseStudy),
            processed: true,
            status: SubmissionStatus::Pending,
            discovered_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn var(key: &str, display: &str) -> SchemaVar {
        SchemaVar {
            key: key.into(),
            variable_name: key.into(),
            display_name: display.into(),
            var_type: "str".into(),
        }
    }

    #[test]
    fn payload_uses_sentinel_and_summary_fallback() {
        let p = DispatchPayload::from_item(&item());
        assert_eq!(p.published, MISSING_DATE_SENTINEL);
        assert_eq!(p.summary.chars().count(), 500);
        assert_eq!(p.job_title(), format!("Generate case_study post: {}", "A".repeat(50)));
    }

    #[test]
    fn schema_mapping_resolves_specific_names_first() {
        let schema = vec![
            var("workflow_input_1", "Article Title"),
            var("workflow_input_2", "Content Source"),
            var("workflow_input_3", "Raw AI Text"),
            var("workflow_input_4", "Published Date"),
            var("workflow_input_5", "Keywords"),
            var("workflow_input_6", "Tone"),
        ];
        let p = DispatchPayload::from_item(&item());
        let inst = build_instance(&schema, &p).unwrap();
        assert_eq!(inst["workflow_input_2"]["value"], "Blog");
        assert_eq!(inst["workflow_input_3"]["value"].as_str().unwrap().len(), 900);
        assert_eq!(inst["workflow_input_4"]["value"], "N/A");
        assert_eq!(inst["workflow_input_5"]["value"], "ai, rpa");
        assert!(!inst.contains_key("workflow_input_6"));
    }

    #[test]
    fn mapping_without_body_slot_fails() {
        let schema = vec![var("a", "Article Title")];
        let p = DispatchPayload::from_item(&item());
        assert!(matches!(
            build_instance(&schema, &p),
            Err(DispatchError::Mapping(_))
        ));
    }

    #[test]
    fn parse_schema_reads_variables() {
        let doc = json!({
            "name": "wf",
            "jobPayloadSchema": {
                "v1": { "variable_name": "raw_text", "display_name": "Raw Text", "type": "str" }
            }
        });
        let s = parse_schema(&doc).unwrap();
        assert_eq!(s, vec![SchemaVar {
            key: "v1".into(),
            variable_name: "raw_text".into(),
            display_name: "Raw Text".into(),
            var_type: "str".into(),
        }]);
        assert!(parse_schema(&json!({})).is_err());
    }
}
