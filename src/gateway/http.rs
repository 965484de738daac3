//! HTTP-backed data provider
//!
//! POSTs the query parameters as JSON and accepts either a bare array or an
//! object with a `results` array.

use super::{DataProvider, ProviderError, ProviderKind, ProviderResult};
use crate::error::PlanningError;
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

pub struct HttpDataProvider {
    kind: ProviderKind,
    client: Client,
    url: String,
}

impl HttpDataProvider {
    pub fn new(kind: ProviderKind, url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| PlanningError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            kind,
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

fn extract_records(body: Value) -> std::result::Result<Vec<Value>, ProviderError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(ProviderError::InvalidResponse(format!(
                "'results' is not an array: {}",
                other
            ))),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(ProviderError::InvalidResponse(format!(
            "unexpected body: {}",
            other
        ))),
    }
}

#[async_trait]
impl DataProvider for HttpDataProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn query(
        &self,
        params: &Value,
        timeout: Duration,
    ) -> std::result::Result<ProviderResult, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .json(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.kind)
                } else {
                    ProviderError::Unavailable(format!("{} request failed: {}", self.kind, e))
                }
            })?;

        let status = response.status();

        // Nothing known for this query.
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            return Ok(ProviderResult::empty());
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::Unavailable(format!(
                "{} returned {}",
                self.kind, status
            )));
        }

        if !status.is_success() {
            return Err(ProviderError::InvalidResponse(format!(
                "{} returned {}",
                self.kind, status
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("invalid JSON: {}", e)))?;

        extract_records(body).map(ProviderResult::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_records_shapes() {
        assert_eq!(extract_records(json!([1, 2])).unwrap().len(), 2);
        assert_eq!(extract_records(json!({"results": [1]})).unwrap().len(), 1);
        assert!(extract_records(json!({"other": 1})).unwrap().is_empty());
        assert!(extract_records(json!({"results": "x"})).is_err());
    }
}
