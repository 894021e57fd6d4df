//! Operation orchestration.
//!
//! Each CLI command maps to one function here returning a name -> success
//! map. Operations against the same device run independently: one kind
//! failing never stops the others, and the exit code is decided from the
//! aggregate map. Tunnel setup failure marks every requested operation
//! failed without attempting any HTTP call.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::settings::Settings;
use crate::transfer::document::{extract_sources, parse_envelope};
use crate::transfer::rewrite::{RewritePlan, apply_plan};
use crate::transfer::{DocumentKind, DocumentTransferClient};
use crate::tunnel::{TunnelConfig, TunnelSession};

/// Success/failure per requested operation, in stable order.
pub type OperationResults = BTreeMap<String, bool>;

/// Collect the requested kinds from the source device.
pub async fn run_collect(settings: &Settings, kinds: Vec<DocumentKind>) -> Result<OperationResults> {
    let kinds = if kinds.is_empty() {
        DocumentKind::ALL.to_vec()
    } else {
        kinds
    };
    let names: Vec<String> = kinds.iter().map(|k| k.name().to_string()).collect();

    let config = settings.source_tunnel()?;
    let timeout = settings.settings.http_timeout();
    let output_dir = settings.settings.output_dir.clone();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

    let kind_names = names.clone();
    run_with_tunnel(config, &names, move |port| async move {
        let mut results = OperationResults::new();
        let client = match DocumentTransferClient::new(port, timeout) {
            Ok(client) => client,
            Err(e) => {
                error!("failed to build transfer client: {e}");
                return kind_names.iter().map(|n| (n.clone(), false)).collect();
            }
        };

        for kind in kinds {
            let ok = collect_kind(&client, kind, &output_dir, &timestamp).await;
            results.insert(kind.name().to_string(), ok);
        }
        results
    })
    .await
}

async fn collect_kind(
    client: &DocumentTransferClient,
    kind: DocumentKind,
    output_dir: &Path,
    timestamp: &str,
) -> bool {
    match client.collect(kind.index_alias()).await {
        Ok(envelope) => {
            let count = parse_envelope(&envelope).map(|d| d.len()).unwrap_or(0);
            let path = output_dir.join(format!("{}_{timestamp}.json", kind.name()));
            match write_json(&path, &envelope) {
                Ok(()) => {
                    info!("collected {count} {kind} documents into {}", path.display());
                    true
                }
                Err(e) => {
                    error!("failed to write {}: {e}", path.display());
                    false
                }
            }
        }
        Err(e) => {
            error!("failed to collect {kind}: {e}");
            false
        }
    }
}

/// Restore envelope files to the destination device.
///
/// With no flags, both default files are restored (alerts before reports,
/// matching collection layout). Bare filenames resolve against the output
/// directory; paths are used as-is.
pub async fn run_restore(
    settings: &Settings,
    alerts: Option<String>,
    reports: Option<String>,
    file: Option<PathBuf>,
) -> Result<OperationResults> {
    let input_dir = settings.settings.output_dir.clone();

    let mut plan: Vec<(String, PathBuf)> = Vec::new();
    if let Some(file) = file {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        plan.push((name, file));
    } else {
        let both = alerts.is_none() && reports.is_none();
        if both || alerts.is_some() {
            let filename = alerts
                .unwrap_or_else(|| DocumentKind::Alerts.default_filename().to_string());
            plan.push((
                DocumentKind::Alerts.name().to_string(),
                resolve_input_path(&input_dir, &filename),
            ));
        }
        if both || reports.is_some() {
            let filename = reports
                .unwrap_or_else(|| DocumentKind::Reports.default_filename().to_string());
            plan.push((
                DocumentKind::Reports.name().to_string(),
                resolve_input_path(&input_dir, &filename),
            ));
        }
    }

    let names: Vec<String> = plan.iter().map(|(name, _)| name.clone()).collect();
    let config = settings.destination_tunnel()?;
    let timeout = settings.settings.http_timeout();

    let file_names = names.clone();
    run_with_tunnel(config, &names, move |port| async move {
        let mut results = OperationResults::new();
        let client = match DocumentTransferClient::new(port, timeout) {
            Ok(client) => client,
            Err(e) => {
                error!("failed to build transfer client: {e}");
                return file_names.iter().map(|n| (n.clone(), false)).collect();
            }
        };

        for (name, path) in plan {
            let ok = restore_file(&client, &path).await;
            results.insert(name, ok);
        }
        results
    })
    .await
}

async fn restore_file(client: &DocumentTransferClient, path: &Path) -> bool {
    let envelope: Value = match read_json(path) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!("failed to read {}: {e:#}", path.display());
            return false;
        }
    };

    let documents = match parse_envelope(&envelope) {
        Ok(documents) => documents,
        Err(e) => {
            error!("invalid envelope in {}: {e}", path.display());
            return false;
        }
    };

    if documents.is_empty() {
        warn!("no documents to restore in {}", path.display());
        return true;
    }

    info!(
        "restoring {} documents from {}",
        documents.len(),
        path.display()
    );
    let result = client.restore(&documents).await;
    info!(
        "restore from {} completed: {} succeeded, {} failed",
        path.display(),
        result.succeeded,
        result.failed
    );
    result.is_success()
}

/// Extract only the `_source` definitions from an envelope file. Runs
/// without a tunnel.
pub fn run_extract(
    settings: &Settings,
    kind: DocumentKind,
    input: Option<String>,
) -> Result<OperationResults> {
    let dir = settings.settings.output_dir.clone();
    let input_path = resolve_input_path(
        &dir,
        &input.unwrap_or_else(|| kind.default_filename().to_string()),
    );
    let operation = format!("{}_extract", kind.name());

    let ok = extract_to_file(&input_path, &dir, kind);
    Ok(OperationResults::from([(operation, ok)]))
}

fn extract_to_file(input_path: &Path, output_dir: &Path, kind: DocumentKind) -> bool {
    let envelope: Value = match read_json(input_path) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!("failed to read {}: {e:#}", input_path.display());
            return false;
        }
    };

    let sources = match extract_sources(&envelope) {
        Ok(sources) => sources,
        Err(e) => {
            error!("invalid envelope in {}: {e}", input_path.display());
            return false;
        }
    };

    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let output_path = output_dir.join(format!("{}_definitions_{timestamp}.json", kind.name()));
    let extracted_from = input_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let count = sources.len();
    let payload = serde_json::json!({
        "definitions": sources,
        "count": count,
        "extracted_from": extracted_from,
    });

    match write_json(&output_path, &payload) {
        Ok(()) => {
            info!("extracted {count} definitions to {}", output_path.display());
            true
        }
        Err(e) => {
            error!("failed to write {}: {e}", output_path.display());
            false
        }
    }
}

/// Rewrite a collected alert file using a plan file. Runs without a tunnel.
pub fn run_update(
    settings: &Settings,
    input: PathBuf,
    alert: PathBuf,
    output: PathBuf,
) -> Result<OperationResults> {
    let ok = update_alert_file(settings, &input, &alert, &output);
    Ok(OperationResults::from([("update".to_string(), ok)]))
}

fn update_alert_file(settings: &Settings, input: &Path, alert: &Path, output: &Path) -> bool {
    let plan: RewritePlan = match read_json(input)
        .and_then(|value| serde_json::from_value(value).context("malformed plan file"))
    {
        Ok(plan) => plan,
        Err(e) => {
            error!("failed to load plan from {}: {e:#}", input.display());
            return false;
        }
    };

    if plan.device_ips.is_empty() {
        error!("plan file {} has no 'deviceIp' entries", input.display());
        return false;
    }
    if plan.recipients.is_empty() {
        error!("plan file {} has no 'recipients' entries", input.display());
        return false;
    }

    let mut tree: Value = match read_json(alert) {
        Ok(tree) => tree,
        Err(e) => {
            error!("failed to read {}: {e:#}", alert.display());
            return false;
        }
    };

    let counts = apply_plan(&mut tree, &plan);

    let output_path = match output.to_str() {
        Some(name) => resolve_input_path(&settings.settings.output_dir, name),
        None => output.to_path_buf(),
    };
    match write_json(&output_path, &tree) {
        Ok(()) => {
            info!(
                "updated alert file saved to {} (filtered {}, device ips {}, recipients {}, syslog {})",
                output_path.display(),
                counts.alerts_filtered,
                counts.device_ips,
                counts.recipients,
                counts.syslog_servers
            );
            true
        }
        Err(e) => {
            error!("failed to write {}: {e}", output_path.display());
            false
        }
    }
}

/// Open a tunnel, run `work` against its local port, and always tear the
/// tunnel down — on completion and on interrupt alike.
///
/// If the tunnel cannot be established, every requested operation is
/// reported failed without any HTTP attempt. An interrupt abandons the
/// in-flight work (restores are idempotent, re-running is the recovery
/// path) and also reports the operations failed so the process exits
/// non-zero.
async fn run_with_tunnel<F, Fut>(
    config: TunnelConfig,
    operations: &[String],
    work: F,
) -> Result<OperationResults>
where
    F: FnOnce(u16) -> Fut,
    Fut: Future<Output = OperationResults>,
{
    let all_failed = || {
        operations
            .iter()
            .map(|name| (name.clone(), false))
            .collect::<OperationResults>()
    };

    let mut session = match TunnelSession::open(config).await {
        Ok(session) => session,
        Err(e) => {
            error!("failed to establish tunnel: {e}");
            return Ok(all_failed());
        }
    };

    let outcome = tokio::select! {
        results = work(session.local_port()) => Some(results),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, tearing the tunnel down");
            None
        }
    };

    session.close().await;

    Ok(outcome.unwrap_or_else(all_failed))
}

/// Bare filenames resolve against the working directory for envelopes;
/// anything with a path separator is used as-is.
fn resolve_input_path(dir: &Path, name: &str) -> PathBuf {
    if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        PathBuf::from(name)
    } else {
        dir.join(name)
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Print the final per-operation summary banner.
pub fn print_summary(title: &str, results: &OperationResults) {
    let banner = "=".repeat(50);
    println!("\n{banner}");
    println!("{title}");
    println!("{banner}");
    for (name, ok) in results {
        let status = if *ok { "SUCCESS" } else { "FAILED" };
        println!("{}: {status}", name.to_uppercase());
    }
    println!("{banner}");
}

/// Zero only when every requested operation succeeded.
pub fn all_succeeded(results: &OperationResults) -> bool {
    results.values().all(|ok| *ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_names_resolve_against_the_output_dir() {
        let dir = Path::new("json_files");
        assert_eq!(
            resolve_input_path(dir, "alerts.json"),
            PathBuf::from("json_files/alerts.json")
        );
        assert_eq!(
            resolve_input_path(dir, "exports/alerts.json"),
            PathBuf::from("exports/alerts.json")
        );
    }

    #[test]
    fn exit_policy_requires_every_operation_to_succeed() {
        let mut results = OperationResults::new();
        results.insert("alerts".to_string(), true);
        results.insert("reports".to_string(), true);
        assert!(all_succeeded(&results));

        results.insert("reports".to_string(), false);
        assert!(!all_succeeded(&results));
    }

    #[test]
    fn extract_writes_definitions_with_count() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("alerts.json");
        fs::write(
            &input,
            json!({
                "hits": { "total": 2, "hits": [
                    { "_index": "alerts-idx", "_id": "a1", "_source": { "name": "cpu" } },
                    { "_index": "alerts-idx", "_id": "a2", "_source": { "name": "disk" } },
                ]}
            })
            .to_string(),
        )
        .unwrap();

        assert!(extract_to_file(&input, dir.path(), DocumentKind::Alerts));

        let written = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| {
                path.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with("alerts_definitions_"))
            })
            .expect("definitions file written");

        let payload: Value = serde_json::from_str(&fs::read_to_string(written).unwrap()).unwrap();
        assert_eq!(payload["count"], json!(2));
        assert_eq!(payload["definitions"].as_array().unwrap().len(), 2);
        assert_eq!(payload["extracted_from"], json!("alerts.json"));
    }

    #[test]
    fn extract_fails_on_an_envelope_without_hits() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("alerts.json");
        fs::write(&input, json!({ "error": "boom" }).to_string()).unwrap();
        assert!(!extract_to_file(&input, dir.path(), DocumentKind::Alerts));
    }

    #[test]
    fn update_requires_device_ips_and_recipients() {
        let dir = tempfile::tempdir().unwrap();
        let plan = dir.path().join("plan.json");
        let alert = dir.path().join("alerts.json");
        let output = dir.path().join("out.json");
        fs::write(&plan, json!({ "recipients": ["ops@example.com"] }).to_string()).unwrap();
        fs::write(&alert, json!({ "hits": { "hits": [] } }).to_string()).unwrap();

        let settings = Settings::default();
        assert!(!update_alert_file(&settings, &plan, &alert, &output));
        assert!(!output.exists());
    }

    #[test]
    fn update_rewrites_and_writes_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let plan = dir.path().join("plan.json");
        let alert = dir.path().join("alerts.json");
        let output = dir.path().join("out.json");
        fs::write(
            &plan,
            json!({
                "deviceIp": ["192.168.1.1"],
                "recipients": ["ops@example.com"]
            })
            .to_string(),
        )
        .unwrap();
        fs::write(
            &alert,
            json!({
                "hits": { "total": 1, "hits": [
                    { "_id": "a1", "_source": {
                        "name": "cpu",
                        "filters": [ { "field": "deviceIp", "value": "10.0.0.1" } ],
                        "recipients": ["old@example.com"]
                    }}
                ]}
            })
            .to_string(),
        )
        .unwrap();

        let settings = Settings::default();
        assert!(update_alert_file(&settings, &plan, &alert, &output));

        let written: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        let source = &written["hits"]["hits"][0]["_source"];
        assert_eq!(source["filters"][0]["value"], "192.168.1.1");
        assert_eq!(source["recipients"], json!(["ops@example.com"]));
    }
}
