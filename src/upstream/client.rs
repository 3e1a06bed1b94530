//! OpenProject API v3 client.

use std::time::Duration;

use chrono::Utc;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::catalog::{Tool, UpstreamRequest};
use super::error::excerpt;
use super::retry::parse_retry_after;
use super::{RetryPolicy, Upstream, UpstreamError};
use crate::db::{AuthConfig, Params, ServiceConfig};

const HAL_JSON: &str = "application/hal+json";

/// Outcome of a single failed attempt.
enum AttemptError {
    Fatal(UpstreamError),
    Transient {
        reason: String,
        status: Option<u16>,
        retry_after: Option<Duration>,
    },
}

/// reqwest-backed upstream with retry and an overall deadline.
#[derive(Clone)]
pub struct OpenProjectClient {
    http: Client,
    policy: RetryPolicy,
}

impl OpenProjectClient {
    pub fn new(policy: RetryPolicy) -> Result<Self, UpstreamError> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = Client::builder()
            .timeout(policy.attempt_timeout)
            .user_agent(concat!("opgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Transient {
                attempts: 0,
                reason: format!("http client setup failed: {}", e),
                status: None,
            })?;
        Ok(Self { http, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn call_with_retry(
        &self,
        config: &ServiceConfig,
        tool: Tool,
        request: &UpstreamRequest,
    ) -> Result<Value, UpstreamError> {
        let mut retry = 0;
        loop {
            let attempt = retry + 1;
            match self.attempt(config, request).await {
                Ok(value) => {
                    debug!(tool = tool.name(), attempt, "upstream call succeeded");
                    return Ok(value);
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient {
                    reason,
                    status,
                    retry_after,
                }) => {
                    if retry >= self.policy.max_retries {
                        return Err(UpstreamError::Transient {
                            attempts: attempt,
                            reason,
                            status,
                        });
                    }
                    retry += 1;
                    let delay = self.policy.delay_with_hint(retry, retry_after);
                    warn!(
                        tool = tool.name(),
                        attempt,
                        ?status,
                        %reason,
                        delay_ms = delay.as_millis() as u64,
                        "transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(
        &self,
        config: &ServiceConfig,
        request: &UpstreamRequest,
    ) -> Result<Value, AttemptError> {
        let url = format!("{}{}", config.endpoint.trim_end_matches('/'), request.path);
        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(ACCEPT, HAL_JSON);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder = match &config.auth {
            AuthConfig::ApiKey => builder.basic_auth("apikey", Some(&config.api_key)),
            AuthConfig::OAuth { access_token, .. } => builder.bearer_auth(access_token),
            AuthConfig::Jwt {
                token,
                header: None,
            } => builder.bearer_auth(token),
            AuthConfig::Jwt {
                token,
                header: Some(header),
            } => builder.header(header.as_str(), token.as_str()),
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => {
                return Err(AttemptError::Fatal(UpstreamError::InvalidParams(format!(
                    "request could not be built: {}",
                    e.without_url()
                ))));
            }
            Err(e) => {
                let reason = if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    "connection failed".to_string()
                } else {
                    e.without_url().to_string()
                };
                return Err(AttemptError::Transient {
                    reason,
                    status: None,
                    retry_after: None,
                });
            }
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| parse_retry_after(s, Utc::now()));
        let body = response.bytes().await.map_err(|e| AttemptError::Transient {
            reason: format!("reading response failed: {}", e.without_url()),
            status: Some(status.as_u16()),
            retry_after: None,
        })?;

        if status.is_success() {
            if body.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&body).map_err(|_| {
                AttemptError::Fatal(UpstreamError::Decode {
                    body: excerpt(&String::from_utf8_lossy(&body)),
                })
            });
        }

        let text = excerpt(&String::from_utf8_lossy(&body));
        warn!(status = status.as_u16(), body = %text, path = %request.path, "upstream error response");

        match status {
            StatusCode::UNAUTHORIZED => Err(AttemptError::Fatal(UpstreamError::Authentication {
                status: status.as_u16(),
                body: text,
            })),
            StatusCode::TOO_MANY_REQUESTS => Err(AttemptError::Transient {
                reason: "rate limited".to_string(),
                status: Some(status.as_u16()),
                retry_after,
            }),
            s if s.is_server_error() => Err(AttemptError::Transient {
                reason: format!("server error {}", s.as_u16()),
                status: Some(s.as_u16()),
                retry_after,
            }),
            s => Err(AttemptError::Fatal(UpstreamError::Rejected {
                status: s.as_u16(),
                body: text,
            })),
        }
    }
}

impl Upstream for OpenProjectClient {
    async fn invoke(
        &self,
        config: &ServiceConfig,
        tool: Tool,
        params: &Params,
    ) -> Result<Value, UpstreamError> {
        let request = tool.build_request(params)?;
        let ceiling = self.policy.overall_timeout;

        match tokio::time::timeout(ceiling, self.call_with_retry(config, tool, &request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = tool.name(), ceiling_ms = ceiling.as_millis() as u64, "upstream call hit overall deadline");
                Err(UpstreamError::Timeout(ceiling))
            }
        }
    }
}
