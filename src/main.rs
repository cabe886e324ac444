// ABOUTME: Entry point for the picha CLI application.
// ABOUTME: Builds the engine from configuration and runs one operation per invocation.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use picha::config::Config;
use picha::engine::{
    self, DeleteOptions, ImageEngine, ImportOptions, InspectOptions, ListOptions, LoadOptions,
    PruneOptions, SaveOptions,
};
use picha::error::{Error, Result};
use picha::runtime::{
    BollardTransport, Filters, PullOptions, PushOptions, RegistryAuth, SearchOptions,
};
use picha::types::ImageRef;
use serde::Serialize;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag when set
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let cwd = env::current_dir()?;
    let config = Config::resolve(cli.config.as_deref(), &cwd)?;

    if let Commands::Config = cli.command {
        print_json(config.as_ref())?;
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let engine = engine::connect(Arc::clone(&config)).await?;
    let outcome = dispatch(&engine, &config, cli.command, &cancel).await;
    let released = engine.shutdown().await;

    let code = outcome?;
    released?;
    Ok(code)
}

async fn dispatch(
    engine: &ImageEngine<BollardTransport>,
    config: &Config,
    command: Commands,
    cancel: &CancellationToken,
) -> Result<ExitCode> {
    match command {
        Commands::Exists { image } => {
            let found = engine.exists(&ImageRef::new(image), cancel).await?;
            print_json(&found)?;
            return Ok(if found {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            });
        }
        Commands::Ls { all, filters } => {
            let options = ListOptions {
                all,
                filters: parse_filters(&filters)?,
            };
            print_json(&engine.list(&options, cancel).await?)?;
        }
        Commands::Inspect { images, size } => {
            let images: Vec<ImageRef> = images.into_iter().map(ImageRef::new).collect();
            let report = engine
                .inspect(&images, &InspectOptions { size }, cancel)
                .await?;
            print_json(&report)?;
        }
        Commands::History { image } => {
            print_json(&engine.history(&ImageRef::new(image), cancel).await?)?;
        }
        Commands::Pull {
            image,
            all_tags,
            creds,
            tls_verify,
            quiet,
        } => {
            let options = PullOptions {
                all_tags,
                credentials: creds.as_deref().map(parse_credentials),
                tls_verify,
                quiet,
            };
            print_json(&engine.pull(&ImageRef::new(image), &options, cancel).await?)?;
        }
        Commands::Push {
            image,
            destination,
            creds,
        } => {
            let options = PushOptions {
                credentials: creds.as_deref().map(parse_credentials),
            };
            let destination = destination.unwrap_or_default();
            engine
                .push(&ImageRef::new(image), &destination, &options, cancel)
                .await?;
        }
        Commands::Tag { image, tags } => {
            engine.tag(&ImageRef::new(image), &tags, cancel).await?;
        }
        Commands::Untag { image, tags } => {
            engine.untag(&ImageRef::new(image), &tags, cancel).await?;
        }
        Commands::Load { input, name } => {
            print_json(&engine.load(&LoadOptions { input, name }, cancel).await?)?;
        }
        Commands::Import {
            source,
            reference,
            changes,
            message,
        } => {
            let source_is_url = source.starts_with("http://") || source.starts_with("https://");
            let options = ImportOptions {
                source,
                source_is_url,
                changes,
                message,
                reference,
            };
            print_json(&engine.import(&options, cancel).await?)?;
        }
        Commands::Save {
            image,
            output,
            format,
            compress,
        } => {
            let options = SaveOptions {
                source: ImageRef::new(image),
                output,
                format: format.unwrap_or(config.images.save_format),
                compress: compress || config.images.compress,
            };
            engine.save(&options, cancel).await?;
        }
        Commands::Diff { image } => {
            print_json(&engine.diff(&ImageRef::new(image), cancel).await?)?;
        }
        Commands::Prune { all, filters } => {
            let options = PruneOptions {
                all,
                filters: parse_filters(&filters)?,
            };
            print_json(&engine.prune(&options, cancel).await?)?;
        }
        Commands::Rm { images, force } => {
            let images: Vec<ImageRef> = images.into_iter().map(ImageRef::new).collect();
            let report = engine
                .delete(&images, &DeleteOptions { force }, cancel)
                .await?;
            print_json(&report)?;
        }
        Commands::Search {
            term,
            limit,
            filters,
        } => {
            let options = SearchOptions {
                limit,
                filters: parse_filters(&filters)?,
            };
            print_json(&engine.search(&term, &options, cancel).await?)?;
        }
        Commands::Config => print_json(&*engine.config())?,
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Group repeated `key=value` flags by key.
fn parse_filters(raw: &[String]) -> Result<Filters> {
    let mut filters = Filters::new();
    for entry in raw {
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            Error::InvalidArgument(format!("filter {entry:?} is not key=value"))
        })?;
        filters
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }
    Ok(filters)
}

fn parse_credentials(raw: &str) -> RegistryAuth {
    let (username, password) = raw.split_once(':').unwrap_or((raw, ""));
    RegistryAuth {
        username: username.to_string(),
        password: password.to_string(),
        server: None,
    }
}
