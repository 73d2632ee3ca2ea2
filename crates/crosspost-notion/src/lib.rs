//! Notion adapter: contact database lookup, document block listing, and
//! image download.
//!
//! The contact database is read-only to us: one select property classifies
//! the platform, a multi-select carries the category tags, and a rich-text
//! property holds the contact name or channel id.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crosspost_core::{
    domain::Backend,
    errors::Error,
    ports::{Block, BlockSource, ContactLookup, Downloader},
    Result,
};

const API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

// Property names in the contact database.
const PLATFORM_PROP: &str = "Platform";
const CATEGORY_PROP: &str = "Category";
const CONTACT_PROP: &str = "Contact Name / Channel ID";

pub struct NotionClient {
    token: String,
    database_id: String,
    http: reqwest::Client,
}

impl NotionClient {
    /// Fails fast when the integration token is absent. The database id is
    /// only required for contact lookups and may be left empty when the
    /// client is used purely as a document source.
    pub fn new(
        token: impl Into<String>,
        database_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::CredentialsMissing("notion api token"));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client build");
        Ok(Self {
            token,
            database_id: database_id.into(),
            http,
        })
    }

    fn require_database(&self) -> Result<&str> {
        let id = self.database_id.trim();
        if id.is_empty() {
            return Err(Error::Config(
                "NOTION_DATABASE_ID is required for tag selection".to_string(),
            ));
        }
        Ok(id)
    }

    async fn call(&self, req: reqwest::RequestBuilder) -> Result<serde_json::Value> {
        let resp = req
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("notion request error: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Unauthorized(format!(
                "notion rejected the token ({status})"
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Fetch(format!(
                "notion http {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::Fetch(format!("notion json error: {e}")))
    }
}

#[async_trait]
impl BlockSource for NotionClient {
    async fn list_blocks(&self, document_id: &str) -> Result<Vec<Block>> {
        // First page only; deeper pagination is out of scope.
        let value = self
            .call(
                self.http
                    .get(format!("{API_BASE}/blocks/{document_id}/children"))
                    .query(&[("page_size", "100")]),
            )
            .await?;
        Ok(parse_blocks(&value))
    }
}

#[async_trait]
impl ContactLookup for NotionClient {
    async fn contacts(&self, backend: Backend, tags: &[String]) -> Result<Vec<String>> {
        let database_id = self.require_database()?;

        let tag_filters: Vec<serde_json::Value> = tags
            .iter()
            .map(|tag| json!({ "property": CATEGORY_PROP, "multi_select": { "contains": tag } }))
            .collect();
        let filter = json!({
            "and": [
                { "property": PLATFORM_PROP, "select": { "equals": backend.as_str() } },
                { "or": tag_filters },
            ]
        });

        let value = self
            .call(
                self.http
                    .post(format!("{API_BASE}/databases/{database_id}/query"))
                    .json(&json!({ "filter": filter })),
            )
            .await?;

        let contacts = parse_contacts(&value);
        debug!(backend = %backend, count = contacts.len(), "contacts looked up");
        Ok(contacts)
    }

    async fn categories(&self) -> Result<Vec<String>> {
        let database_id = self.require_database()?;
        let value = self
            .call(self.http.get(format!("{API_BASE}/databases/{database_id}")))
            .await?;
        Ok(parse_categories(&value))
    }
}

#[async_trait]
impl Downloader for NotionClient {
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        // Hosted-file URLs are pre-signed; no auth header goes out here.
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("download error: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::Fetch(format!(
                "download http {}: {url}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("download read error: {e}")))?;
        tokio::fs::write(dest, &bytes).await.map_err(Error::Io)?;
        debug!(url, dest = %dest.display(), "image downloaded");
        Ok(())
    }
}

/// Text-bearing kinds contribute their rich-text runs; image blocks
/// contribute their hosted or external URL. Everything else is skipped.
fn parse_blocks(value: &serde_json::Value) -> Vec<Block> {
    let Some(results) = value.get("results").and_then(|r| r.as_array()) else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    for blk in results {
        let Some(kind) = blk.get("type").and_then(|t| t.as_str()) else {
            continue;
        };
        match kind {
            "paragraph" | "heading_1" | "heading_2" | "heading_3" => {
                let runs: Vec<String> = blk
                    .get(kind)
                    .and_then(|k| k.get("rich_text"))
                    .and_then(|r| r.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|run| run.get("plain_text").and_then(|p| p.as_str()))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                if !runs.is_empty() {
                    blocks.push(Block::Text { runs });
                }
            }
            "image" => {
                let image = blk.get(kind);
                let url = image
                    .and_then(|img| match img.get("type").and_then(|t| t.as_str()) {
                        Some("file") => img.get("file").and_then(|f| f.get("url")),
                        _ => img.get("external").and_then(|e| e.get("url")),
                    })
                    .and_then(|u| u.as_str());
                if let Some(url) = url {
                    blocks.push(Block::Image {
                        url: url.to_string(),
                    });
                }
            }
            _ => {}
        }
    }
    blocks
}

fn parse_contacts(value: &serde_json::Value) -> Vec<String> {
    value
        .get("results")
        .and_then(|r| r.as_array())
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    row.get("properties")
                        .and_then(|props| props.get(CONTACT_PROP))
                        .and_then(|contact| contact.get("rich_text"))
                        .and_then(|rich| rich.as_array())
                        .and_then(|arr| arr.first())
                        .and_then(|run| run.get("plain_text"))
                        .and_then(|p| p.as_str())
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_categories(value: &serde_json::Value) -> Vec<String> {
    value
        .get("properties")
        .and_then(|props| props.get(CATEGORY_PROP))
        .and_then(|cat| cat.get("multi_select"))
        .and_then(|ms| ms.get("options"))
        .and_then(|opts| opts.as_array())
        .map(|opts| {
            opts.iter()
                .filter_map(|opt| opt.get("name").and_then(|n| n.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
