//! Client for the remote doorbell service.
//!
//! Two calls are used: listing the visitors recorded for one doorbell, and
//! posting a text message back to one of those visitors.

use std::time::Duration;

use anyhow::Context as _;
use log::debug;
use reqwest::{Client, Url};
use serde::Deserializer;
use serde_derive::Deserialize;
use serde_json::Value;

use crate::config::{DEFAULT_REQUEST_TIMEOUT_SECONDS, DoorbellConfig};
use crate::error::{RelayError, Result};

/// A doorbell ring as reported by the remote service.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VisitorEvent {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub when: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match <Value as serde::Deserialize>::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct DoorbellClient {
    client: Client,
    base_url: Url,
    auth_token: String,
    doorbell_id: String,
}

impl DoorbellClient {
    pub fn new(config: &DoorbellConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(
            config
                .request_timeout_seconds
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        );
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(&config.server_url)
            .with_context(|| format!("Invalid doorbell server_url: {}", config.server_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Doorbell server_url cannot be a base: {}", config.server_url);
        }

        Ok(DoorbellClient {
            client,
            base_url,
            auth_token: config.auth_token.clone(),
            doorbell_id: config.doorbell_id.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`, so the segments are always available.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn visitors_url(&self) -> Url {
        self.endpoint(&["doorbells", &self.doorbell_id, "visitors"])
    }

    pub fn messages_url(&self, visitor_id: &str) -> Url {
        self.endpoint(&[
            "doorbells",
            &self.doorbell_id,
            "visitors",
            visitor_id,
            "messages",
        ])
    }

    /// Lists the visitors of the configured doorbell, in whatever order the
    /// service returns them.
    pub async fn list_visitors(&self) -> Result<Vec<VisitorEvent>> {
        let url = self.visitors_url();
        debug!("Fetching visitors from {}", url);

        let response = self
            .client
            .get(url)
            .query(&[("authtoken", &self.auth_token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::NetworkFailure(format!(
                "visitor list request returned {}",
                status
            )));
        }

        let body = response.text().await?;
        let visitors: Vec<VisitorEvent> = serde_json::from_str(&body)?;
        debug!("Received {} visitor event(s)", visitors.len());

        Ok(visitors)
    }

    pub async fn post_message(&self, visitor_id: &str, message: &str) -> Result<()> {
        let url = self.messages_url(visitor_id);
        debug!("Posting message to {}", url);

        let response = self
            .client
            .post(url)
            .form(&[("authtoken", self.auth_token.as_str()), ("message", message)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::NetworkFailure(format!(
                "message request returned {}",
                status
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server_url: &str) -> DoorbellClient {
        DoorbellClient::new(&DoorbellConfig {
            server_url: server_url.to_string(),
            auth_token: "tok".to_string(),
            doorbell_id: "65432353".to_string(),
            request_timeout_seconds: Some(2),
        })
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client_for("http://doorbell.example.com/");
        assert_eq!(
            client.visitors_url().as_str(),
            "http://doorbell.example.com/doorbells/65432353/visitors"
        );
        assert_eq!(
            client.messages_url("v 1/2").as_str(),
            "http://doorbell.example.com/doorbells/65432353/visitors/v%201%2F2/messages"
        );

        let client = client_for("http://doorbell.example.com/api");
        assert_eq!(
            client.visitors_url().as_str(),
            "http://doorbell.example.com/api/doorbells/65432353/visitors"
        );
    }

    #[test]
    fn test_invalid_server_url() {
        let config = DoorbellConfig {
            server_url: "not a url".to_string(),
            auth_token: "tok".to_string(),
            doorbell_id: "1".to_string(),
            request_timeout_seconds: None,
        };
        assert!(DoorbellClient::new(&config).is_err());
    }

    #[test]
    fn test_visitor_event_ids() {
        let events: Vec<VisitorEvent> = serde_json::from_str(
            r#"[
                {"id": "v1", "description": "Package left", "when": "2026-10-19T09:00:00Z"},
                {"id": 42, "when": "2026-10-19T08:00:00Z"}
            ]"#,
        )
        .unwrap();
        assert_eq!(events[0].id, "v1");
        assert_eq!(events[1].id, "42");
        assert_eq!(events[1].description, "");

        let bad: std::result::Result<Vec<VisitorEvent>, _> =
            serde_json::from_str(r#"[{"id": null, "when": "x"}]"#);
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_list_visitors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/doorbells/65432353/visitors")
            .match_query(Matcher::UrlEncoded("authtoken".into(), "tok".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": "v1", "description": "Package left", "when": "2026-10-19T09:00:00Z"}]"#)
            .create_async()
            .await;

        let visitors = client_for(&server.url()).list_visitors().await.unwrap();
        assert_eq!(visitors.len(), 1);
        assert_eq!(visitors[0].description, "Package left");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_visitors_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/doorbells/65432353/visitors")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        let err = client_for(&server.url()).list_visitors().await.unwrap_err();
        assert!(matches!(err, RelayError::NetworkFailure(_)));

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/doorbells/65432353/visitors")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"visitors": []}"#)
            .create_async()
            .await;
        let err = client_for(&server.url()).list_visitors().await.unwrap_err();
        assert!(matches!(err, RelayError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_post_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/doorbells/65432353/visitors/123/messages")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("authtoken".into(), "tok".into()),
                Matcher::UrlEncoded("message".into(), "hello world".into()),
            ]))
            .with_status(201)
            .create_async()
            .await;

        client_for(&server.url())
            .post_message("123", "hello world")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        // Nothing listens on the discard port.
        let err = client_for("http://127.0.0.1:9")
            .post_message("123", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NetworkFailure(_)));
    }

    #[tokio::test]
    async fn test_network_errors_hide_token() {
        let client = DoorbellClient::new(&DoorbellConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            auth_token: "SECRET-TOKEN".to_string(),
            doorbell_id: "1".to_string(),
            request_timeout_seconds: Some(2),
        })
        .unwrap();

        let err = client.list_visitors().await.unwrap_err();
        assert!(matches!(err, RelayError::NetworkFailure(_)));
        assert!(!err.to_string().contains("SECRET-TOKEN"));

        let err = client.post_message("123", "hello").await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-TOKEN"));
    }
}
