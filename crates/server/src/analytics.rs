//! Mixpanel page-view tracking.

use bloom_core::config::AnalyticsConfig;
use serde_json::json;
use time::OffsetDateTime;

/// Event name recorded for every rendered app page.
pub const PAGE_VIEW_EVENT: &str = "Page view";

/// Fire-and-forget event tracker. A no-op without a project token.
#[derive(Clone)]
pub struct Analytics {
    http: reqwest::Client,
    token: Option<String>,
    endpoint: String,
}

impl Analytics {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: config.mixpanel_token.clone().filter(|t| !t.is_empty()),
            endpoint: config.endpoint.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(&AnalyticsConfig::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    fn event(&self, token: &str, distinct_id: &str, url: &str) -> serde_json::Value {
        json!([{
            "event": PAGE_VIEW_EVENT,
            "properties": {
                "token": token,
                "distinct_id": distinct_id,
                "url": url,
                "time": OffsetDateTime::now_utc().unix_timestamp(),
            }
        }])
    }

    /// Send the event and wait for the response. Failures are logged.
    pub async fn send_page_view(&self, distinct_id: &str, url: &str) {
        let Some(token) = self.token.as_deref() else {
            return;
        };
        let body = self.event(token, distinct_id, url);

        match self.http.post(&self.endpoint).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(url, "page view tracked");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "analytics endpoint rejected event");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to send analytics event");
            }
        }
    }

    /// Record a page view in the background.
    pub fn track_page_view(&self, distinct_id: &str, url: &str) {
        if !self.is_enabled() {
            return;
        }
        let tracker = self.clone();
        let distinct_id = distinct_id.to_string();
        let url = url.to_string();
        tokio::spawn(async move {
            tracker.send_page_view(&distinct_id, &url).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_page_view_payload() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/track")
                    .body_contains(r#""event":"Page view""#)
                    .body_contains(r#""distinct_id":"ada@salk.edu""#)
                    .body_contains(r#""url":"/app/genes""#);
                then.status(200).body("1");
            })
            .await;

        let analytics = Analytics::new(&AnalyticsConfig {
            mixpanel_token: Some("mp".to_string()),
            endpoint: server.url("/track"),
        });
        analytics.send_page_view("ada@salk.edu", "/app/genes").await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_disabled_without_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200);
            })
            .await;

        let analytics = Analytics::new(&AnalyticsConfig {
            mixpanel_token: None,
            endpoint: server.url("/track"),
        });
        assert!(!analytics.is_enabled());
        analytics.send_page_view("ada@salk.edu", "/app").await;
        mock.assert_hits_async(0).await;
    }
}
