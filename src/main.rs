use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use freshet::app::AppContext;
use freshet::cli::commands::{self, RunOverrides};
use freshet::cli::{CacheAction, Cli, Commands};
use freshet::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = match cli.verbose {
        0 => "freshet=info",
        1 => "freshet=debug",
        _ => "freshet=trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Run {
            workers,
            deadline,
            no_cache_update,
            output,
        } => {
            let overrides = RunOverrides {
                workers,
                deadline_secs: deadline,
                no_cache_update,
                output,
            };
            let token = CancellationToken::new();
            spawn_signal_handler(token.clone());
            commands::run(&ctx, &overrides, token).await?;
        }
        Commands::Feeds => {
            commands::list_feeds(&ctx)?;
        }
        Commands::Cache { action } => match action {
            CacheAction::List { json } => commands::list_cache(&ctx, json)?,
            CacheAction::Prune => commands::prune_cache(&ctx)?,
        },
    }

    Ok(())
}

/// Cancel `token` on SIGINT/SIGTERM (Ctrl-C elsewhere). In-flight feeds
/// finish their current stage; pending ones are abandoned.
fn spawn_signal_handler(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        tokio::spawn(async move {
            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::warn!("Could not install signal handlers: {}", e);
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => {},
                _ = sigint.recv() => {},
            }
            tracing::warn!("Interrupted, cancelling run");
            token.cancel();
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling run");
                token.cancel();
            }
        });
    }
}
