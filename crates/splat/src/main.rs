mod control;
mod orchestrator;
mod registry;

use clap::Parser;
use control::Command;
use orchestrator::{Orchestrator, OrchestratorOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "splat")]
#[command(about = "Run declaratively defined apps as containers behind nginx", long_about = None)]
struct Cli {
    /// App definition files (one YAML per app)
    #[arg(required = true)]
    configs: Vec<PathBuf>,

    /// Nginx conf.d directory
    #[arg(long, default_value = "/etc/nginx/conf.d")]
    nginx_dir: PathBuf,

    /// Host root volume sources must live under
    #[arg(long, default_value = "/srv/splat")]
    volume_root: PathBuf,

    /// Directory for per-app engine and container logs
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// First host port to allocate
    #[arg(long, default_value_t = splat_core::DEFAULT_PORT_BASE)]
    port_base: u16,

    /// Address containers bind to and routes point at
    #[arg(long, default_value = "127.0.0.1")]
    bind_addr: String,

    /// ECR login token for remote pulls
    #[arg(long, env = "ECR_TOKEN", hide_env_values = true)]
    ecr_token: Option<String>,

    /// Per-step startup timeout in seconds
    #[arg(long, default_value_t = 300)]
    step_timeout: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(startup_failures) if startup_failures == 0 => std::process::exit(0),
        Ok(startup_failures) => {
            error!(failed = startup_failures, "fleet degraded at startup");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "fatal");
            std::process::exit(1);
        }
    }
}

/// Returns the number of apps that failed to start; the fleet still runs
/// until a termination request arrives.
async fn run(cli: Cli) -> anyhow::Result<usize> {
    let docker = splat_container::connect().await?;

    let configs = load_configs(cli.configs).await;
    if configs.is_empty() {
        anyhow::bail!("no app definition loaded");
    }

    let orchestrator = Arc::new(Orchestrator::new(
        docker,
        OrchestratorOptions {
            nginx_dir: cli.nginx_dir,
            volume_root: cli.volume_root,
            log_dir: cli.log_dir,
            port_base: cli.port_base,
            bind_addr: cli.bind_addr,
            registry_token: cli.ecr_token,
            step_timeout: Duration::from_secs(cli.step_timeout),
            reload_command: None,
        },
    ));

    let failures = orchestrator.start_fleet(configs).await;
    info!(
        running = orchestrator.registry().len() - failures.len(),
        failed = failures.len(),
        "startup barrier complete"
    );

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(listen_for_signals(tx));
    control::control_loop(Arc::clone(&orchestrator), rx).await;

    Ok(failures.len())
}

/// Load every definition file concurrently; bad files are logged and
/// skipped, failing only that app.
async fn load_configs(paths: Vec<PathBuf>) -> Vec<splat_core::AppConfig> {
    let mut tasks = JoinSet::new();
    for path in paths {
        tasks.spawn_blocking(move || (path.clone(), splat_config::load(&path)));
    }

    let mut configs = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((path, Ok(config))) => {
                info!(path = %path.display(), app = %config.name, "loaded definition");
                configs.push(config);
            }
            Ok((path, Err(e))) => {
                error!(path = %path.display(), error = %e, "skipping definition");
            }
            Err(e) => error!(error = %e, "definition load task aborted"),
        }
    }
    configs
}

/// Translate OS signals into control commands:
/// SIGINT/SIGTERM shut down, SIGHUP reloads, SIGUSR1 dumps status.
async fn listen_for_signals(tx: mpsc::Sender<Command>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGTERM handler");
            return;
        }
    };
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGHUP handler");
            return;
        }
    };
    let mut info_signal = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGUSR1 handler");
            return;
        }
    };

    loop {
        let command = tokio::select! {
            _ = tokio::signal::ctrl_c() => Command::Shutdown,
            _ = terminate.recv() => Command::Shutdown,
            _ = hangup.recv() => Command::Reload,
            _ = info_signal.recv() => Command::StatusDump,
        };
        // The receiver going away means the loop has already wound down.
        if tx.send(command).await.is_err() {
            return;
        }
    }
}
