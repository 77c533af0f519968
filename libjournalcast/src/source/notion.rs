//! Notion database as the journal source
//!
//! Expected properties: `Title` (title), `Content` (rich text, Markdown),
//! `Date` (date), `Status` (select: Ready/Published), `Tags` (multi-select)
//! and an optional `Image` (URL or files).

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{secret_from_env, NotionConfig, NOTION_KEY_ENV};
use crate::error::{Result, ServiceError};
use crate::source::markdown::clean_markdown;
use crate::source::ContentSource;
use crate::types::{EntryStatus, JournalRecord};

const NOTION_API_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

pub struct NotionSource {
    client: Client,
    token: SecretString,
    database_id: String,
    base_url: String,
}

impl NotionSource {
    pub fn new(token: SecretString, database_id: &str) -> Self {
        Self {
            client: Client::new(),
            token,
            database_id: database_id.to_string(),
            base_url: NOTION_API_URL.to_string(),
        }
    }

    /// Build from `[notion]` with the token from `NOTION_KEY`
    pub fn from_config(config: &NotionConfig) -> Result<Self> {
        Ok(Self::new(secret_from_env(NOTION_KEY_ENV)?, &config.database_id))
    }

    /// Point at a different API root (proxies, tests)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(ServiceError::from)?;

        let status = response.status();
        let body = response.text().await.map_err(ServiceError::from)?;
        if !status.is_success() {
            return Err(ServiceError::Api {
                service: "notion".to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }
        serde_json::from_str(&body).map_err(|e| ServiceError::Decode(e.to_string()).into())
    }

    async fn query(&self, filter: Value) -> Result<Vec<Value>> {
        let url = format!("{}/databases/{}/query", self.base_url, self.database_id);
        let response = self
            .send(self.client.post(&url).json(&json!({ "filter": filter })))
            .await?;
        Ok(response["results"].as_array().cloned().unwrap_or_default())
    }
}

fn date_filter(date: NaiveDate) -> Value {
    json!({ "property": "Date", "date": { "equals": date.format("%Y-%m-%d").to_string() } })
}

fn plain_text(items: &Value) -> String {
    items
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["plain_text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn image_of(props: &Value) -> Option<String> {
    let image = &props["Image"];
    image["url"]
        .as_str()
        .or_else(|| image["files"][0]["external"]["url"].as_str())
        .or_else(|| image["files"][0]["file"]["url"].as_str())
        .map(str::to_string)
}

/// Map a database page to a record
fn parse_page(page: &Value) -> Result<JournalRecord> {
    let id = page["id"]
        .as_str()
        .ok_or_else(|| ServiceError::Decode("page without id".to_string()))?;
    let props = &page["properties"];

    let tags = props["Tags"]["multi_select"]
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(JournalRecord {
        id: id.to_string(),
        title: plain_text(&props["Title"]["title"]),
        body: clean_markdown(&plain_text(&props["Content"]["rich_text"])),
        tags,
        image: image_of(props),
    })
}

#[async_trait]
impl ContentSource for NotionSource {
    async fn fetch_ready(&self, date: NaiveDate) -> Result<Option<JournalRecord>> {
        let filter = json!({
            "and": [
                date_filter(date),
                { "property": "Status", "select": { "equals": EntryStatus::Ready.as_str() } }
            ]
        });
        let results = self.query(filter).await?;
        debug!(date = %date, results = results.len(), "Queried Notion");

        match results.first() {
            Some(page) => {
                let record = parse_page(page)?;
                info!(id = %record.id, title = %record.title, "Found journal entry");
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn update_status(&self, id: &str, status: EntryStatus) -> Result<()> {
        let url = format!("{}/pages/{}", self.base_url, id);
        let body = json!({ "properties": { "Status": { "select": { "name": status.as_str() } } } });
        self.send(self.client.patch(&url).json(&body)).await?;
        info!(id, status = %status, "Updated Notion status");
        Ok(())
    }

    async fn has_entry(&self, date: NaiveDate) -> Result<bool> {
        Ok(!self.query(date_filter(date)).await?.is_empty())
    }
}
