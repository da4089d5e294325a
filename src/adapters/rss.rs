// src/adapters/rss.rs
//
// RSS adapter for news-style sources. Fetches one feed and normalizes the
// channel items into `{"items": [{title, link, published_at}]}`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Adapter, FetchError};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> u64 {
    chrono::DateTime::parse_from_rfc2822(ts)
        .ok()
        .and_then(|dt| u64::try_from(dt.timestamp()).ok())
        .unwrap_or(0)
}

pub struct RssAdapter {
    name: String,
    mode: Mode,
}

enum Mode {
    Http {
        url: String,
        client: reqwest::Client,
    },
    // Own copy of the XML so tests don't need 'static fixtures.
    Fixture(String),
}

impl RssAdapter {
    pub fn from_url(name: impl Into<String>, url: String) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url,
                client: reqwest::Client::new(),
            },
        }
    }

    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn parse_feed(xml: &str) -> Result<Value, FetchError> {
        let rss: Rss = quick_xml::de::from_str(xml)
            .map_err(|e| FetchError::parse(format!("parsing rss xml: {e}")))?;

        let items: Vec<Value> = rss
            .channel
            .item
            .into_iter()
            .filter(|it| it.title.as_deref().is_some_and(|t| !t.trim().is_empty()))
            .map(|it| {
                json!({
                    "title": it.title.as_deref().unwrap_or_default().trim(),
                    "link": it.link,
                    "published_at": it.pub_date.as_deref().map(parse_rfc2822_to_unix).unwrap_or(0),
                })
            })
            .collect();

        Ok(json!({ "items": items }))
    }
}

#[async_trait]
impl Adapter for RssAdapter {
    async fn fetch(&self) -> Result<Value, FetchError> {
        match &self.mode {
            Mode::Fixture(xml) => Self::parse_feed(xml),
            Mode::Http { url, client } => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| FetchError::transport(format!("rss http get: {e}")))?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(FetchError::upstream_rejected(format!(
                        "feed returned {status}"
                    )));
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| FetchError::transport(format!("rss body: {e}")))?;
                Self::parse_feed(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
