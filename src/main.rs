use anyhow::{bail, Context};
use livemark::browser::launch_browser;
use livemark::cli::{Cli, Command};
use livemark::clients::ControlClient;
use livemark::config::{Config, LogTarget};
use livemark::coordinator::{self, Coordinator, Role};
use livemark::session::registered_path;
use std::panic;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    let cli = Cli::parse();

    // Load configuration
    let loaded = Config::load();
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    }
    .with_cli(&cli);

    init_tracing(&config);
    if let Err(e) = loaded {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
    }

    let result = match cli.command {
        Command::Start { file } => start(&config, &file).await,
        Command::Stop { file } => stop(&config, file.as_deref()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing. Nothing is installed when logging is off.
fn init_tracing(config: &Config) {
    let target = config.log_target();
    if target == LogTarget::Off {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let stdout = (target == LogTarget::Stdout).then(|| fmt::layer().with_writer(std::io::stdout));
    let stderr = (target == LogTarget::Stderr).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(stderr)
        .init();
}

async fn canonical(file: &Path) -> anyhow::Result<PathBuf> {
    tokio::fs::canonicalize(file)
        .await
        .with_context(|| format!("cannot preview {}", file.display()))
}

fn open_preview(config: &Config, id: &str) {
    if !config.launch {
        return;
    }
    // Failing to open a browser never stops the preview
    if let Err(e) = launch_browser(&config.preview_url(id), config.browser.as_deref()) {
        eprintln!("warning: {}", e);
    }
}

async fn start(config: &Config, file: &Path) -> anyhow::Result<()> {
    let file = canonical(file).await?;
    info!(
        "start command: port={}; launch={}, browser={:?}; file={:?}",
        config.port, config.launch, config.browser, file
    );

    match coordinator::establish(config).await? {
        Role::Coordinator(coordinator) => run_coordinator(config, coordinator, &file).await,
        Role::Client(client) => {
            let id = client
                .add_file(&file)
                .await
                .context("could not preview markdown file")?;
            println!("{}", config.preview_url(&id));
            open_preview(config, &id);
            Ok(())
        }
    }
}

async fn run_coordinator(config: &Config, coordinator: Coordinator, file: &Path) -> anyhow::Result<()> {
    let registry = coordinator.registry();
    let shutdown = coordinator.shutdown_token();
    let server = tokio::spawn(coordinator.serve());

    let id = match registry.add(file).await {
        Ok(id) => id,
        Err(e) => {
            shutdown.cancel();
            let _ = server.await;
            return Err(e).context("could not preview markdown file");
        }
    };
    println!("{}", config.preview_url(&id));
    open_preview(config, &id);

    // Ctrl-C tears everything down like `stop` would
    let signal_registry = registry.clone();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, shutting down");
            signal_registry.remove_all().await;
            signal_shutdown.cancel();
        }
    });

    server.await.context("preview server task failed")??;
    Ok(())
}

async fn stop(config: &Config, file: Option<&Path>) -> anyhow::Result<()> {
    info!("stop command: port={}; file={:?}", config.port, file);
    let client = ControlClient::new(config.base_url())?;

    let Some(file) = file else {
        client.shutdown().await.context("could not shut down the preview server")?;
        return Ok(());
    };

    // The file may be gone while its session is still previewed
    let file = registered_path(file)
        .await
        .with_context(|| format!("cannot resolve {}", file.display()))?;
    let Some(id) = client.get_id(&file).await? else {
        bail!("{} is not being previewed", file.display());
    };
    client
        .delete_session(&id)
        .await
        .with_context(|| format!("could not stop previewing {}", file.display()))?;
    Ok(())
}
