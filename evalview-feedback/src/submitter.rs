// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Transport for feedback submissions

use async_trait::async_trait;
use evalview_core::config::FeedbackConfig;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SubmitError};

/// Sends one feedback payload for one row
#[async_trait]
pub trait FeedbackSubmitter: Send + Sync {
    async fn submit(&self, row_id: &str, payload: &Value) -> Result<()>;
}

#[async_trait]
impl<T: FeedbackSubmitter + ?Sized> FeedbackSubmitter for Arc<T> {
    async fn submit(&self, row_id: &str, payload: &Value) -> Result<()> {
        (**self).submit(row_id, payload).await
    }
}

/// Posts feedback as JSON to `{base_url}/rows/{row_id}/feedback`
pub struct HttpFeedbackSubmitter {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpFeedbackSubmitter {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let raw = base_url.as_ref();
        let base_url = Url::parse(raw)
            .map_err(|e| SubmitError::Invalid(format!("bad API base URL {:?}: {}", raw, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SubmitError::Invalid(format!(
                "API base URL {:?} cannot hold a path",
                raw
            )));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &FeedbackConfig) -> Result<Self> {
        Self::new(
            config.api_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Row ids are percent-encoded as a single path segment
    pub fn endpoint(&self, row_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["rows", row_id, "feedback"]);
        }
        url
    }
}

#[async_trait]
impl FeedbackSubmitter for HttpFeedbackSubmitter {
    async fn submit(&self, row_id: &str, payload: &Value) -> Result<()> {
        if row_id.is_empty() {
            return Err(SubmitError::Invalid("row id must not be empty".to_string()));
        }

        let url = self.endpoint(row_id);
        debug!("POST {}", url);

        let response = self.client.post(url).json(payload).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::Rejected { status, body });
        }

        Ok(())
    }
}
