use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use numgate::{Config, Orchestrator};

/// Initialize tracing with NUMGATE_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("NUMGATE_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("numgate={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    // Exactly one of the two fmt layers is present.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(use_json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!use_json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .try_init();
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env();
    info!(
        listen = %format!("{}:{}", config.listen_host, config.listen_port),
        helper = %config.helper.base_url(),
        command = %config.helper.command.display(),
        script = %config.helper.script_path.display(),
        "numgate {}",
        env!("CARGO_PKG_VERSION")
    );

    let orchestrator = Orchestrator::new(config)?;
    orchestrator.run().await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // A missing .env is fine; real environment variables still apply.
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Gateway exited with error");
            ExitCode::FAILURE
        }
    }
}
