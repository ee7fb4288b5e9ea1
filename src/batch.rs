// Batch flow for `create-multiview-tasks`: discover view sets, print the
// plan, then (unless dry-run) log in and create one task per set.
//
// Uploads are strictly sequential. A failed task is reported and counted but
// never stops the batch.

use crate::api::{ApiClient, LoginRequest, TaskDescriptor, TaskRequest};
use crate::config::Config;
use crate::discovery::{discover_view_sets, ViewSet};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info};

fn rule() -> String {
    "=".repeat(60)
}

/// Tally of a finished upload loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub created: usize,
    pub failed: usize,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// How a batch run ended when it got past discovery and login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Plan printed, nothing sent.
    DryRun { planned: usize },
    Completed(Summary),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        match self {
            Outcome::DryRun { .. } => true,
            Outcome::Completed(summary) => summary.is_success(),
        }
    }
}

/// Run the whole batch. `credentials` is only called once we know a login is
/// needed, so dry runs never prompt.
///
/// Errors are the fatal cases: bad data dir, nothing to upload, or a failed
/// login. Per-task failures end up in the returned [`Summary`].
pub fn run<F>(config: &Config, credentials: F) -> Result<Outcome>
where
    F: FnOnce() -> Result<LoginRequest>,
{
    println!("\nScanning for video sets in: {}", config.data_dir.display());
    println!("Datasets: {}", config.datasets.join(", "));

    let discovery = discover_view_sets(config)?;
    let mut sets = discovery.view_sets;
    if sets.is_empty() {
        bail!("No valid video sets found!");
    }

    if apply_limit(&mut sets, config.limit) {
        println!("\nLimited to {} tasks", sets.len());
    }

    println!("\n{}", rule());
    println!("Tasks to create: {}", sets.len());
    println!("{}", rule());
    for line in plan_lines(&sets) {
        println!("{line}");
    }

    if config.dry_run {
        println!("\n{}", rule());
        println!("[DRY RUN] No tasks created.");
        println!("{}", rule());
        return Ok(Outcome::DryRun {
            planned: sets.len(),
        });
    }

    println!("\nConnecting to {}...", config.host);
    let mut api = ApiClient::new(&config.host)?;
    api.set_org(config.org.clone());
    let login = credentials()?;
    api.login(&login).context("Authentication failed!")?;
    println!("[OK] Logged in as {}", login.username);

    let summary = submit_all(&api, &sets);

    println!("\n{}", rule());
    println!("Summary: {} created, {} failed", summary.created, summary.failed);
    println!("{}", rule());

    Ok(Outcome::Completed(summary))
}

/// Truncate to `limit` sets. Returns whether anything was dropped.
pub fn apply_limit(sets: &mut Vec<ViewSet>, limit: Option<usize>) -> bool {
    match limit {
        Some(limit) if sets.len() > limit => {
            sets.truncate(limit);
            true
        }
        _ => false,
    }
}

/// Task names grouped under `dataset/subdir` headings, headings sorted.
pub fn plan_lines(sets: &[ViewSet]) -> Vec<String> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for set in sets {
        groups
            .entry(format!("{}/{}", set.dataset, set.subdirectory))
            .or_default()
            .push(set.task_name());
    }

    let mut lines = Vec::new();
    for (key, names) in groups {
        lines.push(format!("\n{key}:"));
        lines.extend(names.into_iter().map(|name| format!("  - {name}")));
    }
    lines
}

/// Create one task per set, in order, and count the results.
pub fn submit_all(api: &ApiClient, sets: &[ViewSet]) -> Summary {
    let mut summary = Summary::default();
    let total = sets.len();

    for (i, set) in sets.iter().enumerate() {
        print_banner(set);

        match submit_one(api, set, i + 1, total) {
            Ok(task) => {
                println!("\n[OK] Task created successfully!");
                println!("  ID: {}", task.id);
                println!("  URL: {}", api.task_url(task.id));
                info!("Created task {} ({})", task.id, task.name);
                summary.created += 1;
            }
            Err(e) => {
                println!("\n[ERROR] Failed to create task");
                println!("  {e}");
                error!("Task {} failed: {e}", set.task_name());
                summary.failed += 1;
            }
        }
    }
    summary
}

fn submit_one(
    api: &ApiClient,
    set: &ViewSet,
    index: usize,
    total: usize,
) -> Result<TaskDescriptor, crate::error::ApiError> {
    // Spinner keeps ticking on its own thread while the blocking upload runs.
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("[{index}/{total}] Uploading {}", set.task_name()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = api.create_multiview_task(&TaskRequest::from(set));
    spinner.finish_and_clear();
    result
}

fn print_banner(set: &ViewSet) {
    println!("\n{}", rule());
    println!("Creating Task: {}", set.task_name());
    println!("{}", rule());
    println!("Dataset: {}", set.dataset);
    println!("Subdir: {}", set.subdirectory);
    println!("Session ID: {}", set.session_id);
    println!("Part: {}", set.part_number);
    println!("Views: {}", set.view_count());
    for (i, view) in set.views.iter().enumerate() {
        let name = view
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        println!("  View{}: {}", i + 1, name);
    }
    println!("{}", rule());
}
