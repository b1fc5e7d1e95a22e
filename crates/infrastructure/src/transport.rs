//! Delivery of notices and route stats to the monitoring backend.

use async_trait::async_trait;
use grpcbrake_domain::Notice;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::routes::RouteStatsBatch;
use crate::{Error, Result};

/// Backend acknowledgement of a delivered notice
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NoticeReceipt {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Backend transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one notice
    async fn send_notice(&self, notice: &Notice) -> Result<NoticeReceipt>;

    /// Deliver one batch of aggregated route stats
    async fn send_route_stats(&self, batch: &RouteStatsBatch) -> Result<()>;
}

/// HTTP transport speaking the Airbrake v3 notice and v5 route stats APIs
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    notices_url: Url,
    routes_url: Url,
}

impl HttpTransport {
    /// Create a transport for `project_id` on the backend at `host`.
    ///
    /// `host` is the base URL; API paths are resolved against it.
    pub fn new(host: &str, project_id: u64, project_key: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(host)
            .map_err(|e| Error::Configuration(format!("Invalid backend host '{}': {}", host, e)))?;
        // `join` replaces the last path segment unless the base ends with a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let notices_url = base
            .join(&format!("api/v3/projects/{}/notices", project_id))
            .map_err(|e| Error::Configuration(e.to_string()))?;
        let routes_url = base
            .join(&format!("api/v5/projects/{}/routes-stats", project_id))
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("grpcbrake/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", project_key))
                .map_err(|_| Error::Configuration("Invalid project key".to_string()))?,
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            notices_url,
            routes_url,
        })
    }

    pub fn notices_url(&self) -> &Url {
        &self.notices_url
    }

    pub fn routes_url(&self) -> &Url {
        &self.routes_url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Http {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_notice(&self, notice: &Notice) -> Result<NoticeReceipt> {
        debug!(notice_id = %notice.id, url = %self.notices_url, "Sending notice");

        let response = self
            .http
            .post(self.notices_url.clone())
            .json(notice)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(NoticeReceipt::default());
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_route_stats(&self, batch: &RouteStatsBatch) -> Result<()> {
        debug!(routes = batch.routes.len(), url = %self.routes_url, "Sending route stats");

        let response = self
            .http
            .put(self.routes_url.clone())
            .json(batch)
            .send()
            .await?;
        Self::check(response).await?;

        Ok(())
    }
}

/// Transport that writes notices and route stats to the log
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send_notice(&self, notice: &Notice) -> Result<NoticeReceipt> {
        info!(
            notice_id = %notice.id,
            component = notice.component().unwrap_or(""),
            action = notice.action().unwrap_or(""),
            message = %notice.message(),
            "Notice"
        );
        Ok(NoticeReceipt {
            id: Some(notice.id.to_string()),
            url: None,
        })
    }

    async fn send_route_stats(&self, batch: &RouteStatsBatch) -> Result<()> {
        for entry in &batch.routes {
            info!(
                method = %entry.method,
                route = %entry.route,
                status_code = entry.status_code,
                count = entry.count,
                sum_ms = entry.sum,
                "Route stats"
            );
        }
        Ok(())
    }
}
