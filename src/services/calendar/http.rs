use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{CalendarSync, SyncOperation};
use crate::models::Interval;

/// Calendar collaborator reached over HTTP.
///
/// `GET {base}/staff/{id}/busy?timeMin=..&timeMax=..` returns
/// `{"events": [{"kind": "busy", "start": .., "end": ..}, ..]}` and
/// `POST {base}/appointments/{id}/sync` requests a push.
pub struct HttpCalendarSync {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpCalendarSync {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    events: Vec<FeedEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum FeedEvent {
    Busy {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Working shift published on the staff calendar; not busy time.
    Shift {
        #[allow(dead_code)]
        start: DateTime<Utc>,
        #[allow(dead_code)]
        end: DateTime<Utc>,
    },
    #[serde(other)]
    Unknown,
}

fn busy_intervals(staff_id: &str, events: Vec<FeedEvent>) -> Vec<Interval> {
    events
        .into_iter()
        .filter_map(|event| match event {
            FeedEvent::Busy { start, end } => match Interval::new(start, end) {
                Ok(interval) => Some(interval),
                Err(e) => {
                    tracing::warn!(staff_id, error = %e, "dropping malformed external event");
                    None
                }
            },
            FeedEvent::Shift { .. } | FeedEvent::Unknown => None,
        })
        .collect()
}

#[async_trait]
impl CalendarSync for HttpCalendarSync {
    async fn fetch_busy_events(
        &self,
        staff_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Interval>> {
        let url = format!("{}/staff/{}/busy", self.base_url, staff_id);

        let feed: FeedResponse = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("timeMin", time_min.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("timeMax", time_max.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ])
            .send()
            .await
            .context("failed to call calendar feed")?
            .error_for_status()
            .context("calendar feed returned error")?
            .json()
            .await
            .context("failed to parse calendar feed")?;

        Ok(busy_intervals(staff_id, feed.events))
    }

    async fn push_appointment_sync(
        &self,
        appointment_id: &str,
        staff_id: &str,
        operation: SyncOperation,
    ) -> anyhow::Result<()> {
        let url = format!("{}/appointments/{}/sync", self.base_url, appointment_id);

        self.client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({
                "staffId": staff_id,
                "operation": operation,
            }))
            .send()
            .await
            .context("failed to push calendar sync")?
            .error_for_status()
            .context("calendar sync returned error")?;

        Ok(())
    }
}
