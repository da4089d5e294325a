// src/adapters/fixture.rs
//
// Canned adapter for tests and local demo configs: either returns the same
// payload forever, or plays back a script of results (then repeats the last
// one). Optional artificial delay to exercise timeout/isolation paths.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Adapter, FetchError};

pub struct FixtureAdapter {
    name: String,
    script: Mutex<VecDeque<Result<Value, FetchError>>>,
    last: Mutex<Result<Value, FetchError>>,
    delay: Option<Duration>,
}

impl FixtureAdapter {
    /// Always return the same payload.
    pub fn steady(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(Ok(payload)),
            delay: None,
        }
    }

    /// Play back `steps` in order; once exhausted, keep repeating the final
    /// step.
    pub fn from_script(name: impl Into<String>, steps: Vec<Result<Value, FetchError>>) -> Self {
        let mut script: VecDeque<_> = steps.into();
        let last = script
            .back()
            .cloned()
            .unwrap_or_else(|| Ok(Value::Object(Default::default())));
        // Keep the final step out of the queue so it becomes the steady state.
        script.pop_back();
        Self {
            name: name.into(),
            script: Mutex::new(script),
            last: Mutex::new(last),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Adapter for FixtureAdapter {
    async fn fetch(&self) -> Result<Value, FetchError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let next = self
            .script
            .lock()
            .expect("fixture script mutex poisoned")
            .pop_front();
        match next {
            Some(step) => step,
            None => self.last.lock().expect("fixture last mutex poisoned").clone(),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn script_plays_in_order_then_repeats_last() {
        let adapter = FixtureAdapter::from_script(
            "demo",
            vec![
                Ok(json!({"n": 1})),
                Err(FetchError::transport("down")),
                Ok(json!({"n": 2})),
            ],
        );
        assert_eq!(adapter.fetch().await.unwrap()["n"], 1);
        assert!(adapter.fetch().await.is_err());
        assert_eq!(adapter.fetch().await.unwrap()["n"], 2);
        // Steady state repeats the final step.
        assert_eq!(adapter.fetch().await.unwrap()["n"], 2);
    }
}
