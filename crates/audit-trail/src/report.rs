//! Audit queries, statistics and export

use chrono::{DateTime, Timelike, Utc};
use portfolio_monitor_core::export::json_rows_to_delimited;
use portfolio_monitor_core::stats::tally;
use portfolio_monitor_core::{AppError, AppResult, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::event::AuditEvent;

/// Audit log query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilters {
    pub user_id: Option<String>,
    pub action: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub severity: Option<Severity>,
    /// Keep only the most recent N matches
    pub limit: Option<usize>,
}

impl AuditFilters {
    /// Exact-match filters understood by the record store
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(user_id) = &self.user_id {
            query.push(("userId".to_string(), user_id.clone()));
        }
        if let Some(action) = &self.action {
            query.push(("action".to_string(), action.clone()));
        }
        if let Some(severity) = self.severity {
            query.push(("severity".to_string(), severity.as_str().to_string()));
        }
        query
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.user_id.as_ref().map_or(true, |u| &event.user_id == u)
            && self.action.as_ref().map_or(true, |a| &event.action == a)
            && self.severity.map_or(true, |s| event.severity == s)
            && self.start_date.map_or(true, |start| event.timestamp >= start)
            && self.end_date.map_or(true, |end| event.timestamp <= end)
    }

    /// Filters `events` (oldest first) and applies the limit
    pub fn apply(&self, events: Vec<AuditEvent>) -> Vec<AuditEvent> {
        let mut matched: Vec<AuditEvent> = events.into_iter().filter(|e| self.matches(e)).collect();
        if let Some(limit) = self.limit {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }
        matched
    }
}

/// Audit export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    /// Tab-separated, spreadsheet friendly
    Tsv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "tsv" | "excel" => Ok(ExportFormat::Tsv),
            other => Err(AppError::validation(
                format!("Unsupported export format '{}'", other),
                Some("format"),
                Some(other),
            )),
        }
    }
}

pub fn render_events(events: &[AuditEvent], format: ExportFormat) -> AppResult<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(events)?),
        ExportFormat::Csv | ExportFormat::Tsv => {
            let rows = events
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()?;
            let delimiter = if format == ExportFormat::Csv { ',' } else { '\t' };
            Ok(json_rows_to_delimited(&rows, delimiter))
        }
    }
}

/// Aggregated view over a window of audit events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total_actions: usize,
    pub actions_by_type: BTreeMap<String, usize>,
    pub actions_by_user: BTreeMap<String, usize>,
    pub actions_by_severity: BTreeMap<String, usize>,
    /// Event count per UTC hour of day
    pub time_distribution: BTreeMap<u32, usize>,
}

impl AuditStats {
    pub fn from_events(events: &[AuditEvent]) -> Self {
        let mut time_distribution = BTreeMap::new();
        for event in events {
            *time_distribution.entry(event.timestamp.hour()).or_insert(0) += 1;
        }

        Self {
            total_actions: events.len(),
            actions_by_type: tally(events, |e| e.action.clone()),
            actions_by_user: tally(events, |e| e.user_id.clone()),
            actions_by_severity: tally(events, |e| e.severity.as_str()),
            time_distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{into_details, AuditStatus};
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use uuid::Uuid;

    fn event(action: &str, user: &str, hour: u32) -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 16, hour, 0, 0).unwrap(),
            action: action.to_string(),
            details: into_details(json!({"note": "a,b"})),
            user_id: user.to_string(),
            session_id: "s".to_string(),
            user_agent: "ua".to_string(),
            ip_address: "127.0.0.1".to_string(),
            severity: crate::event::severity_for_action(action),
            status: AuditStatus::Success,
        }
    }

    #[test]
    fn test_filters_and_limit() {
        let events = vec![
            event("AUTH_LOGIN", "1", 8),
            event("DATA_READ", "1", 9),
            event("DATA_READ", "2", 10),
            event("AUTH_LOGOUT", "1", 11),
        ];

        let by_user = AuditFilters {
            user_id: Some("1".into()),
            ..Default::default()
        };
        assert_eq!(by_user.apply(events.clone()).len(), 3);

        let limited = AuditFilters {
            limit: Some(2),
            ..Default::default()
        }
        .apply(events.clone());
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].action, "AUTH_LOGOUT");

        let start = events[1].timestamp + Duration::minutes(30);
        let windowed = AuditFilters {
            start_date: Some(start),
            severity: Some(Severity::High),
            ..Default::default()
        }
        .apply(events);
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].action, "AUTH_LOGOUT");
    }

    #[test]
    fn test_query_params() {
        let filters = AuditFilters {
            action: Some("AUTH_LOGIN".into()),
            severity: Some(Severity::High),
            limit: Some(10),
            ..Default::default()
        };
        let query = filters.to_query();
        assert_eq!(query.len(), 2);
        assert!(query.contains(&("severity".to_string(), "high".to_string())));
    }

    #[test]
    fn test_stats() {
        let events = vec![
            event("AUTH_LOGIN", "1", 8),
            event("DATA_READ", "1", 8),
            event("DATA_READ", "2", 14),
        ];
        let stats = AuditStats::from_events(&events);
        assert_eq!(stats.total_actions, 3);
        assert_eq!(stats.actions_by_type["DATA_READ"], 2);
        assert_eq!(stats.actions_by_user["1"], 2);
        assert_eq!(stats.actions_by_severity["medium"], 2);
        assert_eq!(stats.time_distribution[&8], 2);
        assert_eq!(stats.time_distribution[&14], 1);
    }

    #[test]
    fn test_render_formats() {
        let events = vec![event("AUTH_LOGIN", "1", 8), event("DATA_READ", "2", 9)];

        let csv = render_events(&events, ExportFormat::Csv).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.lines().next().unwrap().contains("action"));

        let tsv = render_events(&events, ExportFormat::Tsv).unwrap();
        assert!(tsv.lines().next().unwrap().contains('\t'));

        let json = render_events(&events, ExportFormat::Json).unwrap();
        let parsed: Vec<AuditEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);

        assert_eq!("excel".parse::<ExportFormat>().unwrap(), ExportFormat::Tsv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
