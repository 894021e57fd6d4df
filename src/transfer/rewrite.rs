//! Pure rewrites over collected JSON trees.
//!
//! Collected alert definitions embed environment-specific values: device-IP
//! filters, mail recipients and syslog destinations. Before restoring into a
//! different environment those values get rewritten from a plan file. Every
//! pass is a pure recursive transform over `serde_json::Value` that mutates
//! in place and returns how many nodes changed.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Replacement values loaded from a plan file.
///
/// `device_ips` and `recipients` are required by the update operation;
/// an empty `syslog_servers` list means "strip syslog destinations" and an
/// empty `alert_names` list means "keep every alert".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RewritePlan {
    #[serde(rename = "deviceIp", default)]
    pub device_ips: Vec<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(rename = "syslogservers", default)]
    pub syslog_servers: Vec<String>,
    #[serde(rename = "alert_names", default)]
    pub alert_names: Vec<String>,
}

/// Outcome of applying a full [`RewritePlan`] to one tree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteCounts {
    pub alerts_filtered: usize,
    pub device_ips: usize,
    pub recipients: usize,
    pub syslog_servers: usize,
}

/// Apply every pass of `plan` to `value`.
pub fn apply_plan(value: &mut Value, plan: &RewritePlan) -> RewriteCounts {
    RewriteCounts {
        alerts_filtered: filter_alerts_by_name(value, &plan.alert_names),
        device_ips: rewrite_device_ips(value, &plan.device_ips),
        recipients: rewrite_recipients(value, &plan.recipients),
        syslog_servers: rewrite_syslog_servers(value, &plan.syslog_servers),
    }
}

/// Replace the value of every `{"field": "deviceIp", "value": ...}` filter,
/// cycling through the replacement list in document order.
pub fn rewrite_device_ips(value: &mut Value, ips: &[String]) -> usize {
    if ips.is_empty() {
        return 0;
    }
    let mut next = 0;
    walk_device_ips(value, ips, &mut next)
}

fn walk_device_ips(value: &mut Value, ips: &[String], next: &mut usize) -> usize {
    let mut changed = 0;
    match value {
        Value::Object(map) => {
            let is_device_filter = map.get("field").and_then(Value::as_str) == Some("deviceIp")
                && map.contains_key("value");
            if is_device_filter {
                let ip = &ips[*next % ips.len()];
                map.insert("value".to_string(), Value::String(ip.clone()));
                *next += 1;
                changed += 1;
            }
            for (_, nested) in map.iter_mut() {
                changed += walk_device_ips(nested, ips, next);
            }
        }
        Value::Array(items) => {
            for item in items {
                changed += walk_device_ips(item, ips, next);
            }
        }
        _ => {}
    }
    changed
}

/// Replace every `recipients` array with the replacement list.
pub fn rewrite_recipients(value: &mut Value, recipients: &[String]) -> usize {
    let mut changed = 0;
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if key == "recipients" && nested.is_array() {
                    *nested = Value::Array(
                        recipients.iter().cloned().map(Value::String).collect(),
                    );
                    changed += 1;
                } else {
                    changed += rewrite_recipients(nested, recipients);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                changed += rewrite_recipients(item, recipients);
            }
        }
        _ => {}
    }
    changed
}

/// Replace every `syslogServers` entry with destinations built from
/// `servers`, or empty it when no servers are given.
pub fn rewrite_syslog_servers(value: &mut Value, servers: &[String]) -> usize {
    let mut changed = 0;
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if key == "syslogServers" {
                    *nested = Value::Array(
                        servers
                            .iter()
                            .enumerate()
                            .map(|(i, host)| syslog_server_entry(host, i))
                            .collect(),
                    );
                    changed += 1;
                } else {
                    changed += rewrite_syslog_servers(nested, servers);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                changed += rewrite_syslog_servers(item, servers);
            }
        }
        _ => {}
    }
    changed
}

fn syslog_server_entry(host: &str, position: usize) -> Value {
    let mut entry = Map::new();
    entry.insert("host".to_string(), Value::String(host.to_string()));
    entry.insert("port".to_string(), Value::from(514));
    entry.insert("facility".to_string(), Value::String("LOG_AUDIT".to_string()));
    entry.insert(
        "serverId".to_string(),
        Value::String(format!("updated-server-{}", position + 1)),
    );
    Value::Object(entry)
}

/// Drop hits whose `_source.name` is not in `names`; hits without a name are
/// kept. The filtered envelope's `hits.total` is updated to match. Returns
/// the number of hits removed. An empty `names` list keeps everything.
pub fn filter_alerts_by_name(value: &mut Value, names: &[String]) -> usize {
    if names.is_empty() {
        return 0;
    }

    let mut removed = 0;
    match value {
        Value::Object(map) => {
            if let Some(hits_obj) = map.get_mut("hits").and_then(Value::as_object_mut) {
                if let Some(hits) = hits_obj.get_mut("hits").and_then(Value::as_array_mut) {
                    let before = hits.len();
                    hits.retain(|hit| {
                        match hit
                            .get("_source")
                            .and_then(|source| source.get("name"))
                            .and_then(Value::as_str)
                        {
                            Some(name) => names.iter().any(|wanted| wanted == name),
                            None => true,
                        }
                    });
                    removed = before - hits.len();
                    let total = hits.len();
                    hits_obj.insert("total".to_string(), Value::from(total));
                    return removed;
                }
            }
            for (_, nested) in map.iter_mut() {
                removed += filter_alerts_by_name(nested, names);
            }
        }
        Value::Array(items) => {
            for item in items {
                removed += filter_alerts_by_name(item, names);
            }
        }
        _ => {}
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn device_ip_filters_cycle_through_replacements() {
        let mut tree = json!({
            "filters": [
                { "type": "termFilter", "field": "deviceIp", "value": "10.0.0.1" },
                { "type": "termFilter", "field": "deviceIp", "value": "10.0.0.2" },
                { "type": "termFilter", "field": "deviceIp", "value": "10.0.0.3" },
                { "type": "termFilter", "field": "severity", "value": "high" },
            ]
        });

        let changed = rewrite_device_ips(&mut tree, &strings(&["192.168.1.1", "192.168.1.2"]));
        assert_eq!(changed, 3);
        assert_eq!(tree["filters"][0]["value"], "192.168.1.1");
        assert_eq!(tree["filters"][1]["value"], "192.168.1.2");
        assert_eq!(tree["filters"][2]["value"], "192.168.1.1");
        // Non-deviceIp filters are untouched.
        assert_eq!(tree["filters"][3]["value"], "high");
    }

    #[test]
    fn device_ip_rewrite_with_no_replacements_is_a_no_op() {
        let mut tree = json!({ "field": "deviceIp", "value": "10.0.0.1" });
        assert_eq!(rewrite_device_ips(&mut tree, &[]), 0);
        assert_eq!(tree["value"], "10.0.0.1");
    }

    #[test]
    fn recipients_are_replaced_wherever_they_appear() {
        let mut tree = json!({
            "alert": {
                "notification": { "recipients": ["old@example.com"] },
                "escalation": { "recipients": [] }
            }
        });

        let changed = rewrite_recipients(&mut tree, &strings(&["ops@example.com"]));
        assert_eq!(changed, 2);
        assert_eq!(
            tree["alert"]["notification"]["recipients"],
            json!(["ops@example.com"])
        );
        assert_eq!(
            tree["alert"]["escalation"]["recipients"],
            json!(["ops@example.com"])
        );
    }

    #[test]
    fn syslog_servers_are_rebuilt_with_default_port_and_facility() {
        let mut tree = json!({
            "alert": { "syslogServers": [ { "host": "old", "port": 1514 } ] }
        });

        let changed = rewrite_syslog_servers(&mut tree, &strings(&["syslog-1", "syslog-2"]));
        assert_eq!(changed, 1);
        assert_eq!(
            tree["alert"]["syslogServers"],
            json!([
                { "host": "syslog-1", "port": 514, "facility": "LOG_AUDIT", "serverId": "updated-server-1" },
                { "host": "syslog-2", "port": 514, "facility": "LOG_AUDIT", "serverId": "updated-server-2" },
            ])
        );
    }

    #[test]
    fn empty_syslog_plan_strips_destinations() {
        let mut tree = json!({ "syslogServers": [ { "host": "old" } ] });
        assert_eq!(rewrite_syslog_servers(&mut tree, &[]), 1);
        assert_eq!(tree["syslogServers"], json!([]));
    }

    #[test]
    fn alert_name_filter_keeps_named_and_anonymous_hits() {
        let mut envelope = json!({
            "hits": { "total": 3, "hits": [
                { "_id": "a1", "_source": { "name": "cpu" } },
                { "_id": "a2", "_source": { "name": "disk" } },
                { "_id": "a3", "_source": { } },
            ]}
        });

        let removed = filter_alerts_by_name(&mut envelope, &strings(&["cpu"]));
        assert_eq!(removed, 1);
        let hits = envelope["hits"]["hits"].as_array().unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0]["_id"], "a1");
        assert_eq!(hits[1]["_id"], "a3");
        assert_eq!(envelope["hits"]["total"], json!(2));
    }

    #[test]
    fn empty_name_list_keeps_every_alert() {
        let mut envelope = json!({
            "hits": { "total": 1, "hits": [ { "_id": "a1", "_source": { "name": "cpu" } } ] }
        });
        assert_eq!(filter_alerts_by_name(&mut envelope, &[]), 0);
        assert_eq!(envelope["hits"]["hits"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn apply_plan_runs_every_pass() {
        let mut envelope = json!({
            "hits": { "total": 2, "hits": [
                {
                    "_id": "a1",
                    "_source": {
                        "name": "cpu",
                        "filters": [ { "field": "deviceIp", "value": "10.0.0.1" } ],
                        "recipients": ["old@example.com"],
                        "syslogServers": []
                    }
                },
                { "_id": "a2", "_source": { "name": "disk" } },
            ]}
        });

        let plan = RewritePlan {
            device_ips: strings(&["192.168.1.1"]),
            recipients: strings(&["ops@example.com"]),
            syslog_servers: vec![],
            alert_names: strings(&["cpu"]),
        };

        let counts = apply_plan(&mut envelope, &plan);
        assert_eq!(counts.alerts_filtered, 1);
        assert_eq!(counts.device_ips, 1);
        assert_eq!(counts.recipients, 1);
        assert_eq!(counts.syslog_servers, 1);
    }

    #[test]
    fn plan_deserializes_from_the_analyzer_layout() {
        let plan: RewritePlan = serde_json::from_value(json!({
            "deviceIp": ["192.168.1.1"],
            "recipients": ["ops@example.com"],
            "syslogservers": ["syslog-1"],
            "alert_names": ["cpu"]
        }))
        .unwrap();

        assert_eq!(plan.device_ips, strings(&["192.168.1.1"]));
        assert_eq!(plan.syslog_servers, strings(&["syslog-1"]));
    }

    #[test]
    fn plan_sections_default_to_empty() {
        let plan: RewritePlan = serde_json::from_value(json!({})).unwrap();
        assert!(plan.device_ips.is_empty());
        assert!(plan.alert_names.is_empty());
    }
}
