use std::path::Path;

use agenda_core::config::SyncConfig;
use agenda_core::db::Database;
use agenda_core::remote::RemoteProvider;
use agenda_core::sync::{ReconciliationDriver, ReconciliationReport, SyncOutcome};

use crate::commands::common::{open_database, provider_from_env, short_id};
use crate::error::CliError;

pub async fn run_reconcile(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let (config, provider) = provider_from_env()?;
    let db = open_database(db_path)?;
    let report = reconcile_with(&db, &provider, &config, limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn reconcile_with<P: RemoteProvider + ?Sized>(
    db: &Database,
    provider: &P,
    config: &SyncConfig,
    limit: usize,
) -> Result<ReconciliationReport, CliError> {
    let driver = ReconciliationDriver::new(db, provider, config);
    Ok(driver.reconcile_pending(limit).await?)
}

pub fn format_report_lines(report: &ReconciliationReport) -> Vec<String> {
    let mut lines = report
        .items
        .iter()
        .map(|item| {
            let sync = match &item.sync {
                SyncOutcome::Unchanged => "unchanged".to_string(),
                SyncOutcome::Synced { remote_id } => format!("synced -> {remote_id}"),
                SyncOutcome::Pushed { remote_id } => format!("pushed -> {remote_id}"),
                SyncOutcome::NotDue => "backing off".to_string(),
                SyncOutcome::RetryLater { error } => format!("retry later: {error}"),
                SyncOutcome::FailedTerminally { error } => format!("failed: {error}"),
            };
            let drift = item.drift.map_or("-", |kind| kind.as_str());
            format!("{:<13}  drift={drift:<16}  {sync}", short_id(&item.item_id.to_string()))
        })
        .collect::<Vec<_>>();

    lines.push(format!(
        "{} items: {} ok, {} retry later, {} conflicted, {} failed",
        report.items.len(),
        report.succeeded(),
        report.retried_later(),
        report.conflicted(),
        report.failed_terminally()
    ));
    lines
}
