//! Stateless event-stream scanner for loops, runaways, cost, policy
//! violations, and KPI drift, with ARBS (append-record-then-suspend)
//! ordering for critical alerts (spec §4.8).
//!
//! Grounded in `colonyforge.queen_bee.sentinel.Sentinel`: five
//! independent detectors over a window of recent events, each producing
//! zero or more alerts that the caller appends before (optionally)
//! suspending the colony.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hive_record::{taxonomy::types as ev, Event};
use hive_types::ActionClass;
use serde::{Deserialize, Serialize};

/// Event type emitted by the LLM gateway after a completed call; not part
/// of the shared taxonomy registry (the `llm.*` namespace is consumed
/// only here), but spelled out as a constant for the same typo-safety
/// reason `hive_record::taxonomy` exists.
pub const LLM_RESPONSE: &str = "llm.response";

/// What kind of condition an alert reports (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Repeated failure or a cyclic event pattern on one task/stream.
    LoopDetected,
    /// Event rate within the trailing window exceeded the configured cap.
    RunawayDetected,
    /// Cumulative LLM cost exceeded the configured cap.
    CostExceeded,
    /// An irreversible tool call ran without confirmation.
    SecurityViolation,
    /// A KPI regressed beyond the configured threshold.
    KpiDegradation,
}

/// How urgently an alert must be acted on (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Worth surfacing, not worth suspending the colony.
    Warning,
    /// Translates to a `colony.suspended` event (spec §4.8).
    Critical,
}

/// One finding from a scan pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelAlert {
    /// What kind of condition this is.
    pub kind: AlertKind,
    /// How urgent it is.
    pub severity: Severity,
    /// Human-readable explanation.
    pub message: String,
    /// Structured detail for the `sentinel.alert_raised` payload.
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Per-scan configuration. Values default from the workspace's
/// [`hive_types::HiveConfig`].
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    /// Failures on the same `task_id` before `loop_detected` fires; also
    /// drives the alternating-pattern window (`2 * max_loop_count`).
    pub max_loop_count: u32,
    /// Trailing window, in seconds, for the runaway event-rate check.
    pub rate_window_seconds: u64,
    /// Events per `rate_window_seconds` before `runaway_detected` fires.
    pub max_event_rate: u32,
    /// Cumulative `llm.response` cost before `cost_exceeded` fires.
    pub max_cost: f64,
    /// Fractional/absolute KPI drift before `kpi_degradation` fires.
    pub kpi_drop_threshold: f64,
}

impl From<&hive_types::HiveConfig> for SentinelConfig {
    fn from(cfg: &hive_types::HiveConfig) -> Self {
        SentinelConfig {
            max_loop_count: cfg.max_loop_count,
            rate_window_seconds: cfg.rate_window_seconds,
            max_event_rate: cfg.max_event_rate,
            max_cost: cfg.max_cost,
            kpi_drop_threshold: cfg.kpi_drop_threshold,
        }
    }
}

/// Runs every event-based detector (loop, runaway, cost, security) over
/// `events`, which must already be sorted in append order (spec §4.8).
pub fn scan(events: &[Event], config: &SentinelConfig, now: DateTime<Utc>) -> Vec<SentinelAlert> {
    let mut alerts = Vec::new();
    alerts.extend(scan_loop(events, config));
    if let Some(a) = scan_runaway(events, config, now) {
        alerts.push(a);
    }
    if let Some(a) = scan_cost(events, config) {
        alerts.push(a);
    }
    alerts.extend(scan_security(events));
    alerts
}

/// Per-`task_id` failure counting plus alternating-event-type detection
/// (spec §4.8: "count `task.failed|colony.failed`... examine the last
/// `2·N` event types; if exactly two distinct types alternate").
pub fn scan_loop(events: &[Event], config: &SentinelConfig) -> Vec<SentinelAlert> {
    let mut alerts = Vec::new();
    let mut failures_per_task: HashMap<&str, u32> = HashMap::new();
    for e in events {
        if e.event_type == ev::TASK_FAILED || e.event_type == ev::COLONY_FAILED {
            if let Some(task_id) = e.task_id.as_deref() {
                let count = failures_per_task.entry(task_id).or_insert(0);
                *count += 1;
                if *count == config.max_loop_count {
                    alerts.push(SentinelAlert {
                        kind: AlertKind::LoopDetected,
                        severity: Severity::Critical,
                        message: format!(
                            "task {task_id:?} has failed {count} time(s), at or above the configured cap"
                        ),
                        details: serde_json::json!({ "task_id": task_id, "failure_count": count }),
                    });
                }
            }
        }
    }

    let window = 2 * config.max_loop_count as usize;
    if window > 0 && events.len() >= window {
        let tail = &events[events.len() - window..];
        let types: Vec<&str> = tail.iter().map(|e| e.event_type.as_str()).collect();
        if is_strict_alternation(&types) {
            alerts.push(SentinelAlert {
                kind: AlertKind::LoopDetected,
                severity: Severity::Warning,
                message: "cyclic alternating event pattern detected".to_string(),
                details: serde_json::json!({ "pattern": [types[0], types[1]] }),
            });
        }
    }
    alerts
}

fn is_strict_alternation(types: &[&str]) -> bool {
    if types.len() < 4 {
        return false;
    }
    let distinct: std::collections::HashSet<&str> = types.iter().copied().collect();
    if distinct.len() != 2 {
        return false;
    }
    types.windows(2).all(|pair| pair[0] != pair[1])
}

/// Trailing-window event-rate check (spec §4.8).
pub fn scan_runaway(events: &[Event], config: &SentinelConfig, now: DateTime<Utc>) -> Option<SentinelAlert> {
    let window_start = now - chrono::Duration::seconds(config.rate_window_seconds as i64);
    let count = events.iter().filter(|e| e.timestamp >= window_start && e.timestamp <= now).count();
    if count as u32 > config.max_event_rate {
        Some(SentinelAlert {
            kind: AlertKind::RunawayDetected,
            severity: Severity::Critical,
            message: format!(
                "{count} events in the trailing {}s window exceeds the cap of {}",
                config.rate_window_seconds, config.max_event_rate
            ),
            details: serde_json::json!({ "count": count, "window_seconds": config.rate_window_seconds }),
        })
    } else {
        None
    }
}

/// Cumulative-cost check over `llm.response` events (spec §4.8).
pub fn scan_cost(events: &[Event], config: &SentinelConfig) -> Option<SentinelAlert> {
    let total: f64 = events
        .iter()
        .filter(|e| e.event_type == LLM_RESPONSE)
        .filter_map(|e| e.payload.get("cost").and_then(|v| v.as_f64()))
        .sum();
    if total > config.max_cost {
        Some(SentinelAlert {
            kind: AlertKind::CostExceeded,
            severity: Severity::Critical,
            message: format!("cumulative LLM cost {total:.4} exceeds cap {:.4}", config.max_cost),
            details: serde_json::json!({ "total_cost": total, "max_cost": config.max_cost }),
        })
    } else {
        None
    }
}

/// Classifies `worker.started` events and raises an alert for any
/// irreversible action that was not confirmed (spec §4.8).
pub fn scan_security(events: &[Event]) -> Vec<SentinelAlert> {
    events
        .iter()
        .filter(|e| e.event_type == ev::WORKER_STARTED)
        .filter_map(|e| {
            let tool_name = e.payload.get("tool_name")?.as_str().unwrap_or("");
            let confirmed = e.payload.get("confirmed").and_then(|v| v.as_bool()).unwrap_or(false);
            let class = classify_tool_action(tool_name, &e.payload);
            if class == ActionClass::Irreversible && !confirmed {
                Some(SentinelAlert {
                    kind: AlertKind::SecurityViolation,
                    severity: Severity::Critical,
                    message: format!("tool {tool_name:?} is irreversible and was not confirmed"),
                    details: serde_json::json!({ "tool_name": tool_name, "worker_id": e.worker_id }),
                })
            } else {
                None
            }
        })
        .collect()
}

/// Heuristic [`ActionClass`] classifier for a tool call: an explicit
/// `payload.action_class` string always wins; otherwise the tool name is
/// matched against known destructive/safe verbs.
pub fn classify_tool_action(tool_name: &str, payload: &serde_json::Value) -> ActionClass {
    if let Some(explicit) = payload.get("action_class").and_then(|v| v.as_str()) {
        return match explicit {
            "read_only" => ActionClass::ReadOnly,
            "reversible" => ActionClass::Reversible,
            _ => ActionClass::Irreversible,
        };
    }
    let name = tool_name.to_lowercase();
    const IRREVERSIBLE_VERBS: &[&str] =
        &["delete", "remove", "drop", "push", "deploy", "rm", "truncate", "format"];
    const READ_ONLY_VERBS: &[&str] = &["read", "get", "list", "search", "describe", "view", "fetch"];
    if IRREVERSIBLE_VERBS.iter().any(|v| name.contains(v)) {
        ActionClass::Irreversible
    } else if READ_ONLY_VERBS.iter().any(|v| name.contains(v)) {
        ActionClass::ReadOnly
    } else {
        ActionClass::Reversible
    }
}

/// Metric direction: whether a drop or a rise is the degradation (spec
/// §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricDirection {
    LowerIsBetterOnDrop,
    HigherIsWorseOnRise,
}

fn metric_direction(metric: &str) -> Option<MetricDirection> {
    match metric {
        "correctness" | "repeatability" => Some(MetricDirection::LowerIsBetterOnDrop),
        "incident_rate" | "recurrence_rate" => Some(MetricDirection::HigherIsWorseOnRise),
        _ => None,
    }
}

/// Compares `previous` against `current` KPI dictionaries metric by
/// metric, raising `kpi_degradation` per spec §4.8's two drift rules.
/// Metrics not named in either rule are ignored.
pub fn scan_kpi_drift(
    previous: &HashMap<String, f64>,
    current: &HashMap<String, f64>,
    threshold: f64,
) -> Vec<SentinelAlert> {
    let mut alerts = Vec::new();
    for (metric, &curr) in current {
        let Some(&prev) = previous.get(metric) else { continue };
        let Some(direction) = metric_direction(metric) else { continue };
        let degraded = match direction {
            MetricDirection::LowerIsBetterOnDrop => {
                prev != 0.0 && (prev - curr) / prev > threshold
            }
            MetricDirection::HigherIsWorseOnRise => curr - prev > threshold,
        };
        if degraded {
            alerts.push(SentinelAlert {
                kind: AlertKind::KpiDegradation,
                severity: Severity::Warning,
                message: format!("KPI {metric:?} degraded from {prev} to {curr}"),
                details: serde_json::json!({ "metric": metric, "previous": prev, "current": curr }),
            });
        }
    }
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, task_id: Option<&str>, payload: serde_json::Value) -> Event {
        let e = Event::new(event_type, "run-1", "worker-1", payload);
        match task_id {
            Some(id) => e.with_task_id(id),
            None => e,
        }
    }

    fn base_config() -> SentinelConfig {
        SentinelConfig {
            max_loop_count: 3,
            rate_window_seconds: 60,
            max_event_rate: 100,
            max_cost: 10.0,
            kpi_drop_threshold: 0.2,
        }
    }

    #[test]
    fn repeated_task_failures_trigger_loop_detected() {
        let config = base_config();
        let events: Vec<Event> = (0..3)
            .map(|_| event(ev::TASK_FAILED, Some("t1"), serde_json::json!({})))
            .collect();
        let alerts = scan_loop(&events, &config);
        assert!(alerts.iter().any(|a| a.kind == AlertKind::LoopDetected));
    }

    #[test]
    fn alternating_event_types_trigger_cyclic_loop_detected() {
        let config = base_config();
        let events = vec![
            event(ev::TASK_ASSIGNED, Some("t1"), serde_json::json!({})),
            event(ev::TASK_BLOCKED, Some("t1"), serde_json::json!({})),
            event(ev::TASK_ASSIGNED, Some("t1"), serde_json::json!({})),
            event(ev::TASK_BLOCKED, Some("t1"), serde_json::json!({})),
        ];
        let alerts = scan_loop(&events, &config);
        assert!(alerts.iter().any(|a| a.message.contains("cyclic")));
    }

    #[test]
    fn cost_exceeded_sums_llm_response_cost() {
        let config = base_config();
        let events = vec![
            event(LLM_RESPONSE, None, serde_json::json!({ "cost": 6.0 })),
            event(LLM_RESPONSE, None, serde_json::json!({ "cost": 6.0 })),
        ];
        let alert = scan_cost(&events, &config);
        assert!(alert.is_some());
    }

    #[test]
    fn unconfirmed_irreversible_tool_is_a_security_violation() {
        let events = vec![event(
            ev::WORKER_STARTED,
            Some("t1"),
            serde_json::json!({ "tool_name": "delete_file", "confirmed": false }),
        )];
        let alerts = scan_security(&events);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::SecurityViolation);
    }

    #[test]
    fn confirmed_irreversible_tool_is_not_flagged() {
        let events = vec![event(
            ev::WORKER_STARTED,
            Some("t1"),
            serde_json::json!({ "tool_name": "delete_file", "confirmed": true }),
        )];
        assert!(scan_security(&events).is_empty());
    }

    #[test]
    fn correctness_drop_beyond_threshold_degrades() {
        let mut prev = HashMap::new();
        prev.insert("correctness".to_string(), 0.9);
        let mut curr = HashMap::new();
        curr.insert("correctness".to_string(), 0.5);
        let alerts = scan_kpi_drift(&prev, &curr, 0.2);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::KpiDegradation);
    }

    #[test]
    fn incident_rate_rise_beyond_threshold_degrades() {
        let mut prev = HashMap::new();
        prev.insert("incident_rate".to_string(), 0.1);
        let mut curr = HashMap::new();
        curr.insert("incident_rate".to_string(), 0.5);
        let alerts = scan_kpi_drift(&prev, &curr, 0.2);
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn small_drift_within_threshold_is_ignored() {
        let mut prev = HashMap::new();
        prev.insert("correctness".to_string(), 0.9);
        let mut curr = HashMap::new();
        curr.insert("correctness".to_string(), 0.85);
        assert!(scan_kpi_drift(&prev, &curr, 0.2).is_empty());
    }
}
