// src/adapters/http_json.rs
//
// Generic JSON-over-HTTP adapter: GET one URL, require a JSON object body.
// Covers the bulk of the upstreams (Open-Meteo weather, market prices,
// air quality, transit departures, Hacker News, ...).

use async_trait::async_trait;
use serde_json::Value;

use super::{Adapter, FetchError};

pub struct HttpJsonAdapter {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpJsonAdapter {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

fn classify_reqwest(e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::timeout(format!("http request timed out: {e}"))
    } else {
        FetchError::transport(format!("http request failed: {e}"))
    }
}

#[async_trait]
impl Adapter for HttpJsonAdapter {
    async fn fetch(&self) -> Result<Value, FetchError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::upstream_rejected(format!(
                "upstream returned {status}"
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::transport(format!("reading body: {e}")))?;

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::parse(format!("invalid json: {e}")))?;

        // An HTTP 200 carrying something other than an object is treated as a
        // parse failure, never as a partial success.
        if !value.is_object() {
            return Err(FetchError::parse("expected a top-level json object"));
        }

        Ok(value)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
