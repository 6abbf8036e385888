use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use clap::{
    Parser, Subcommand
};
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use sdm_analyzer::{
    config,
    gateway::{find_project, Gateway},
    http::HttpGateway,
    job::Job,
    status::{status, StatusSummary},
    Error, Scheduler, SharedGateway,
};

// CLI
#[derive(Parser, Debug)]
#[command(name = "sdm-analyzer")]
#[command(version = "0.1")]
#[command(about = "Runs gear pipelines over every session of a project and \
                   resumes them where the last run stopped.",
          long_about = None)
]
struct Cli {
    /// Instance name as found in auth.json
    #[arg(short, long, default_value = config::DEFAULT_INSTANCE)]
    instance: String,

    /// Directory holding auth.json, defaults to ~/.stclient
    #[arg(long)]
    auth_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a pipeline over the project's sessions
    Run {
        /// The pipeline file on disk
        #[arg(short, long)]
        pipeline: PathBuf,

        #[arg(long)]
        session_limit: Option<usize>,

        #[arg(long)]
        max_workers: Option<usize>,
    },

    /// Report per-session progress without running anything
    Status {
        /// The pipeline file on disk
        #[arg(short, long)]
        pipeline: PathBuf,

        #[arg(long)]
        session_limit: Option<usize>,
    },

    /// List the gears available on the instance
    Gears,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .try_init();

    let cli = Cli::parse();
    let auth_dir = match cli.auth_dir {
        Some(dir) => dir,
        None => config::default_auth_dir()?,
    };
    let credentials = config::load_credentials(&auth_dir, &cli.instance)
        .with_context(|| format!("Failed to load credentials for `{}`", cli.instance))?;
    info!("Instance `{}` at `{}`", cli.instance, credentials.url);
    let gateway: SharedGateway = Arc::new(HttpGateway::new(&credentials)?);

    match cli.command {
        Commands::Run { pipeline, session_limit, max_workers } => {
            let job = load_job(&pipeline)?;
            if config::status_only() {
                warn!("`{}` is set, reporting status instead of running.", config::STATUS_ONLY_ENV);
                return report_status(gateway.as_ref(), &job, session_limit).await;
            }
            let mut options = job.batch_options();
            if session_limit.is_some() {
                options.session_limit = session_limit;
            }
            if let Some(n) = max_workers {
                options.max_workers = n;
            }
            let operations = job.operations()?;
            let project = find_project(gateway.as_ref(), &job.schema.project).await?;
            info!("Running pipeline `{}` on project `{}`", job.title, project.label);
            let scheduler = Scheduler::new(gateway.clone(), options);
            match scheduler.run(operations, &project).await {
                Ok(_report) => Ok(()),

                Err(Error::Interrupted) => {
                    warn!("Stopped on request, submitted jobs keep running remotely.");
                    std::process::exit(130);
                },

                Err(e) => Err(e.into()),
            }
        },

        Commands::Status { pipeline, session_limit } => {
            let job = load_job(&pipeline)?;
            report_status(gateway.as_ref(), &job, session_limit).await
        },

        Commands::Gears => {
            let mut gears = gateway.list_gears().await?;
            gears.sort_by(|a, b| a.name.cmp(&b.name));
            for gear in gears {
                println!("{}", gear.name);
            }
            Ok(())
        },
    }
}

fn load_job(path: &Path) -> anyhow::Result<Job> {
    Job::from_file(path)
        .with_context(|| format!("Failed to read the pipeline file `{}`", path.display()))
}

async fn report_status(
    gateway: &dyn Gateway,
    job: &Job,
    session_limit: Option<usize>
) -> anyhow::Result<()> {
    let operations = job.operations()?;
    let project = find_project(gateway, &job.schema.project).await?;
    let limit = session_limit.or(job.schema.session_limit);
    let statuses = status(gateway, &operations, &project, limit).await?;
    for s in &statuses {
        println!("{}\t{}\t{}", s.session_id, s.session_label, s.progress);
    }
    let summary = StatusSummary::of(&statuses);
    println!(
        "{} session(s): {} complete, {} in progress, {} not started",
        statuses.len(),
        summary.complete,
        summary.in_progress,
        summary.not_started
    );
    Ok(())
}
