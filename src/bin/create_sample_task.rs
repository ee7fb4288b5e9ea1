// Entrypoint for `create-sample-task`: uploads one known-good view set so a
// fresh server has something to open in the multiview workspace.
//
// Authenticates with an API token instead of a session login. The token can
// be passed in, read from `~/.multiview_token`, or fetched from the server
// container with `--from-docker`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use multiview_tasks::api::{ApiClient, TaskRequest};
use multiview_tasks::logging::init_tracing;
use multiview_tasks::config::{normalize_host, DEFAULT_HOST, DEFAULT_VIEW_COUNT, ENV_API_TOKEN, ENV_HOST};
use multiview_tasks::token::{fetch_token_from_docker, persist_token, resolve_token, token_file_path};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "create-sample-task",
    version,
    about = "Create a single sample multiview task"
)]
struct Cli {
    /// Folder holding the sample view files
    #[arg(short = 'd', long)]
    data_dir: PathBuf,

    /// Annotation server base URL
    #[arg(long, env = ENV_HOST, default_value = DEFAULT_HOST)]
    host: String,

    /// Task name
    #[arg(long, default_value = "MultiTSF-Session01-Part1-Sample")]
    name: String,

    /// Session id recorded on the task
    #[arg(long, default_value = "01")]
    session_id: String,

    /// Part number recorded on the task and used to pick the files
    #[arg(long, default_value_t = 1)]
    part_number: u32,

    /// Session prefix of the files on disk
    #[arg(long, default_value = "00")]
    file_session: String,

    /// Number of views to upload
    #[arg(long, default_value_t = DEFAULT_VIEW_COUNT, value_parser = clap::value_parser!(u32).range(1..))]
    view_count: u32,

    /// API token
    #[arg(long, env = ENV_API_TOKEN, hide_env_values = true)]
    token: Option<String>,

    /// Mint the token through `docker compose exec` and save it for next time
    #[arg(long)]
    from_docker: bool,

    /// Directory containing the compose file (used with --from-docker)
    #[arg(long, default_value = ".")]
    compose_dir: PathBuf,

    /// Account whose token is fetched (used with --from-docker)
    #[arg(long, default_value = "admin")]
    docker_user: String,
}

/// Paths of `{session}-View{i}-Part{part}.mp4` for i in 1..=view_count.
fn sample_views(dir: &Path, file_session: &str, part: u32, view_count: u32) -> Vec<PathBuf> {
    (1..=view_count)
        .map(|view| dir.join(format!("{file_session}-View{view}-Part{part}.mp4")))
        .collect()
}

fn obtain_token(cli: &Cli) -> Result<String> {
    let token_file = token_file_path();
    if cli.from_docker {
        let token = fetch_token_from_docker(&cli.compose_dir, &cli.docker_user)?;
        persist_token(&token_file, &token)?;
        return Ok(token);
    }
    Ok(resolve_token(cli.token.as_deref(), &token_file)?)
}

fn run(cli: Cli) -> Result<()> {
    let rule = "=".repeat(60);
    println!("{rule}");
    println!("Multiview - Sample Task Creator");
    println!("{rule}\n");

    if !cli.data_dir.is_dir() {
        bail!(
            "Dataset not found at {}\nPlease download the MultiTSF dataset first.",
            cli.data_dir.display()
        );
    }

    let views = sample_views(&cli.data_dir, &cli.file_session, cli.part_number, cli.view_count);
    let missing: Vec<&PathBuf> = views.iter().filter(|p| !p.is_file()).collect();
    if !missing.is_empty() {
        println!("ERROR: Missing video files:");
        for path in &missing {
            println!("  - {}", path.display());
        }
        bail!("{} of {} sample files are missing", missing.len(), views.len());
    }
    println!("Dataset check: OK\n");

    println!("Getting API token...");
    let token = obtain_token(&cli).context("Failed to get API token")?;
    println!("Token: OK\n");

    let host = normalize_host(&cli.host);
    let mut api = ApiClient::new(&host)?;
    api.set_token(&token);

    let req = TaskRequest {
        name: cli.name,
        session_id: cli.session_id,
        part_number: cli.part_number,
        views,
    };
    println!("Creating task: {}", req.name);
    println!("  Session: {}, Part: {}", req.session_id, req.part_number);
    for path in &req.views {
        println!("  Video: {}", path.display());
    }

    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_message("Uploading... (this may take a minute)");
    spinner.enable_steady_tick(Duration::from_millis(120));
    let result = api.create_multiview_task(&req);
    spinner.finish_and_clear();

    let task = result.context("Failed to create task")?;
    println!("\n[SUCCESS] Task created successfully!");
    println!("  Task ID: {}", task.id);
    println!("  Task Name: {}", task.name);
    println!(
        "  Dimension: {}",
        task.dimension.as_deref().unwrap_or("unknown")
    );
    println!("  URL: {}", api.task_url(task.id));

    println!("\n{rule}");
    println!("Next steps:");
    println!("  1. Open your browser: {host}");
    println!("  2. Log in");
    println!("  3. Click on task: {}", task.name);
    println!("  4. Start annotating!");
    println!("{rule}");
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\n[ERROR] {e:#}");
            ExitCode::FAILURE
        }
    }
}
