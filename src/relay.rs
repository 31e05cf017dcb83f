use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::config::RelayConfig;
use crate::doorbell::{DoorbellClient, VisitorEvent};
use crate::error::{RelayError, Result};
use crate::messages::StatusMessage;

/// Bridges device requests to the doorbell service.
///
/// Holds the id of the visitor reported by the last completed fetch, if that
/// fetch found someone at the door. Replies are addressed to that visitor.
pub struct Relay {
    doorbell: DoorbellClient,
    current_visitor: Mutex<Option<String>>,
    freshness_window_ms: i64,
    max_description_len: Option<usize>,
}

impl Relay {
    pub fn new(doorbell: DoorbellClient, config: &RelayConfig) -> Self {
        Relay {
            doorbell,
            current_visitor: Mutex::new(None),
            freshness_window_ms: config.freshness_window_ms(),
            max_description_len: config.max_description_len,
        }
    }

    pub async fn current_visitor(&self) -> Option<String> {
        self.current_visitor.lock().await.clone()
    }

    /// Asks the service who rang last. Failures are logged and reported to the
    /// device as `StatusMessage::unavailable`; the current visitor is kept.
    pub async fn fetch_status(&self) -> StatusMessage {
        match self.try_fetch_status().await {
            Ok(status) => status,
            Err(err) => {
                error!("Error fetching door status: {}", err);
                StatusMessage::unavailable()
            }
        }
    }

    pub async fn try_fetch_status(&self) -> Result<StatusMessage> {
        let visitors = self.doorbell.list_visitors().await?;
        Ok(self.apply_visitors(&visitors, Utc::now()).await)
    }

    async fn apply_visitors(
        &self,
        visitors: &[VisitorEvent],
        now: DateTime<Utc>,
    ) -> StatusMessage {
        let mut current_visitor = self.current_visitor.lock().await;

        match most_recent(visitors) {
            Some((visitor, when)) if is_fresh(now, when, self.freshness_window_ms) => {
                info!("Visitor {} at the door", visitor.id);
                *current_visitor = Some(visitor.id.clone());
                StatusMessage::present(self.describe(visitor))
            }
            _ => {
                debug!("No one at the door");
                *current_visitor = None;
                StatusMessage::absent()
            }
        }
    }

    fn describe(&self, visitor: &VisitorEvent) -> String {
        match self.max_description_len {
            Some(max) => truncate(&visitor.description, max).to_string(),
            None => visitor.description.clone(),
        }
    }

    /// Sends `message` to the current visitor. Without one, nothing is sent.
    pub async fn send_reply(&self, message: &str) -> Result<()> {
        let visitor_id = self.current_visitor.lock().await.clone().ok_or_else(|| {
            RelayError::InvalidState("no visitor at the door to reply to".to_string())
        })?;

        info!("Sending reply to visitor {}", visitor_id);
        self.doorbell.post_message(&visitor_id, message).await
    }
}

/// The event with the latest parseable `when`. Array order is not trusted.
fn most_recent(visitors: &[VisitorEvent]) -> Option<(&VisitorEvent, DateTime<Utc>)> {
    visitors
        .iter()
        .filter_map(|visitor| match parse_when(&visitor.when) {
            Some(when) => Some((visitor, when)),
            None => {
                warn!(
                    "Skipping visitor {} with unparseable time {:?}",
                    visitor.id, visitor.when
                );
                None
            }
        })
        .max_by_key(|(_, when)| *when)
}

/// Accepts RFC 3339, ISO 8601 without an offset (taken as UTC, `T` or space
/// separated) and RFC 2822.
fn parse_when(when: &str) -> Option<DateTime<Utc>> {
    let when = when.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(when) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(when, format) {
            return Some(parsed.and_utc());
        }
    }
    DateTime::parse_from_rfc2822(when)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// True when `when` lies strictly in the past and less than `window_ms` ago.
fn is_fresh(now: DateTime<Utc>, when: DateTime<Utc>, window_ms: i64) -> bool {
    let delta = (now - when).num_milliseconds();
    delta > 0 && delta < window_ms
}

fn truncate(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
