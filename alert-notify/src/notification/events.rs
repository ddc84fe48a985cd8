//! Alert events.
//!
//! An [`AlertEvent`] is one evaluation result of an alert rule, handed to
//! notifiers for delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Evaluated state of an alert rule.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    NoData,
    Paused,
    Alerting,
    Ok,
    Pending,
    Unknown,
}

impl AlertState {
    /// Human-friendly label used in message titles.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoData => "No Data",
            Self::Paused => "Paused",
            Self::Alerting => "Alerting",
            Self::Ok => "OK",
            Self::Pending => "Pending",
            Self::Unknown => "Unknown",
        }
    }
}

/// A metric that matched the alert condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalMatch {
    pub metric: String,
    pub value: Option<f64>,
}

/// One alert evaluation to deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub rule_id: i64,
    pub rule_name: String,
    pub org_id: i64,
    pub state: AlertState,
    pub prev_state: AlertState,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub rule_url: Option<String>,
    #[serde(default)]
    pub eval_matches: Vec<EvalMatch>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(
        org_id: i64,
        rule_id: i64,
        rule_name: impl Into<String>,
        prev_state: AlertState,
        state: AlertState,
    ) -> Self {
        Self {
            rule_id,
            rule_name: rule_name.into(),
            org_id,
            state,
            prev_state,
            message: String::new(),
            rule_url: None,
            eval_matches: Vec::new(),
            image_url: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_rule_url(mut self, url: impl Into<String>) -> Self {
        self.rule_url = Some(url.into());
        self
    }

    pub fn with_eval_match(mut self, metric: impl Into<String>, value: Option<f64>) -> Self {
        self.eval_matches.push(EvalMatch {
            metric: metric.into(),
            value,
        });
        self
    }

    /// Message title, e.g. `[Alerting] CPU high`.
    pub fn title(&self) -> String {
        format!("[{}] {}", self.state.label(), self.rule_name)
    }

    /// True when the rule went back to `Ok`.
    pub fn is_resolved(&self) -> bool {
        self.state == AlertState::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_state_strings() {
        assert_eq!(AlertState::NoData.to_string(), "no_data");
        assert_eq!("alerting".parse::<AlertState>().unwrap(), AlertState::Alerting);
        assert_eq!(
            serde_json::to_string(&AlertState::Ok).unwrap(),
            "\"ok\""
        );
    }

    #[test]
    fn test_event_title() {
        let event = AlertEvent::new(1, 10, "CPU high", AlertState::Ok, AlertState::Alerting);
        assert_eq!(event.title(), "[Alerting] CPU high");
        assert!(!event.is_resolved());
    }
}
