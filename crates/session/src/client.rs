// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client whose requests all pass through the interceptor pipeline.

use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder, Response};

use crate::error::SessionError;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    pipeline: Arc<Pipeline>,
}

impl AuthClient {
    pub fn new(http: Client, pipeline: Arc<Pipeline>) -> Self {
        Self { http, pipeline }
    }

    /// Start building a request. Send it with [`AuthClient::send`].
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Build and send a request through the pipeline.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, SessionError> {
        let request = builder.build()?;
        self.execute(request).await
    }

    /// Run a request through the pipeline, then dispatch it.
    pub async fn execute(&self, request: reqwest::Request) -> Result<Response, SessionError> {
        let request = self.pipeline.apply(request).await;
        Ok(self.http.execute(request).await?)
    }

    /// GET a URL and decode the JSON response.
    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value, SessionError> {
        let resp = self.send(self.request(Method::GET, url)).await?;
        Ok(resp.error_for_status()?.json().await?)
    }

    /// POST JSON to a URL and return the decoded response body.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, SessionError> {
        let resp = self.send(self.request(Method::POST, url).json(body)).await?;
        let bytes = resp.error_for_status()?.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| SessionError::Decode(e.to_string()))
    }
}
