//! Routing rules: which channels receive an event.

use snagbridge_store::RoutingRule;

use crate::event::ErrorEvent;

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// An empty filter allows everything; otherwise the candidate must be one
/// of its values, ignoring case and surrounding whitespace.
fn filter_allows(values: &[String], candidate: &str) -> bool {
    if values.is_empty() {
        return true;
    }
    let candidate = normalize(candidate);
    values.iter().any(|v| normalize(v) == candidate)
}

/// Whether `rule` accepts `event`. Project ownership is checked separately
/// by [`match_destinations`].
pub fn rule_matches(rule: &RoutingRule, event: &ErrorEvent) -> bool {
    filter_allows(&rule.environments, &event.environment)
        && filter_allows(&rule.severities, &event.severity)
        && filter_allows(&rule.events, event.event_type())
}

/// Channels that should show `event`, in rule order and without repeats.
pub fn match_destinations(rules: &[RoutingRule], event: &ErrorEvent) -> Vec<String> {
    let mut destinations: Vec<String> = Vec::new();
    for rule in rules {
        if rule.project_id.trim() != event.project_id {
            continue;
        }
        let channel = rule.channel_id.trim();
        if channel.is_empty() || !rule_matches(rule, event) {
            continue;
        }
        if !destinations.iter().any(|d| d == channel) {
            destinations.push(channel.to_string());
        }
    }
    destinations
}
