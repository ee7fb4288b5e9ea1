// Entrypoint for `create-multiview-tasks`.
// - Parses arguments into an immutable `Config` and hands it to `batch::run`.
// - Exit code 0 means every task was created (or this was a dry run); any
//   fatal error or failed task gives 1.

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Password;
use multiview_tasks::api::LoginRequest;
use multiview_tasks::batch;
use multiview_tasks::logging::init_tracing;
use multiview_tasks::config::{
    normalize_host, Config, DEFAULT_DATASETS, DEFAULT_HOST, DEFAULT_VIEW_COUNT, ENV_HOST, ENV_ORG,
    ENV_PASSWORD, ENV_USER,
};
use multiview_tasks::sessions::parse_sessions;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "create-multiview-tasks",
    version,
    about = "Create multiview annotation tasks from a multisensor dataset",
    after_help = "Examples:
  # every complete set under /mnt/data
  create-multiview-tasks -u admin -p admin123 -d /mnt/data

  # one dataset, two subdirs, sessions 00..10 and 15
  create-multiview-tasks -u admin -d /mnt/data --datasets multisensor_home1 \\
      --subdirs 01 02 --sessions 00-10 15

  # preview only
  create-multiview-tasks -u admin -d /mnt/data --dry-run"
)]
struct Cli {
    /// Annotation server username
    #[arg(short = 'u', long, env = ENV_USER)]
    user: String,

    /// Password (prompted for when omitted)
    #[arg(short = 'p', long, env = ENV_PASSWORD, hide_env_values = true)]
    password: Option<String>,

    /// Annotation server base URL
    #[arg(long, env = ENV_HOST, default_value = DEFAULT_HOST)]
    host: String,

    /// Organization slug (tasks will be shared with org members)
    #[arg(long, env = ENV_ORG)]
    org: Option<String>,

    /// Dataset root path (contains one folder per dataset)
    #[arg(short = 'd', long)]
    data_dir: PathBuf,

    /// Datasets to process
    #[arg(long, num_args = 1.., default_values_t = DEFAULT_DATASETS.map(String::from))]
    datasets: Vec<String>,

    /// Specific subdirs to process (e.g. 01 02 03). Default: auto-detect
    #[arg(long, num_args = 1..)]
    subdirs: Option<Vec<String>>,

    /// Session IDs to include (e.g. 00 01 02, or 00-10 for a range)
    #[arg(long, num_args = 1..)]
    sessions: Option<Vec<String>>,

    /// Number of views per set
    #[arg(long, default_value_t = DEFAULT_VIEW_COUNT, value_parser = clap::value_parser!(u32).range(1..))]
    view_count: u32,

    /// Limit number of tasks to create
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    limit: Option<u64>,

    /// Show what would be created without actually creating
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn into_config(self) -> Result<(Config, String, Option<String>)> {
        let sessions = self.sessions.map(parse_sessions).transpose()?;
        if let Some(sessions) = &sessions {
            println!("Session filter: {:?}", sessions.iter().collect::<Vec<_>>());
        }

        let config = Config {
            host: normalize_host(&self.host),
            data_dir: self.data_dir,
            datasets: self.datasets,
            subdirs: self.subdirs,
            sessions,
            view_count: self.view_count,
            limit: self
                .limit
                .map(usize::try_from)
                .transpose()
                .context("--limit is too large")?,
            dry_run: self.dry_run,
            org: self.org,
        };
        Ok((config, self.user, self.password))
    }
}

fn run() -> Result<bool> {
    let (config, user, password) = Cli::parse().into_config()?;

    let outcome = batch::run(&config, || {
        let password = match password {
            Some(p) => p,
            None => Password::new()
                .with_prompt(format!("Password for {user}"))
                .interact()
                .context("Failed to read password")?,
        };
        Ok(LoginRequest {
            username: user,
            password,
        })
    })?;

    Ok(outcome.is_success())
}

fn main() -> ExitCode {
    init_tracing();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
