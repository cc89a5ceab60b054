use std::path::PathBuf;
use std::process::ExitCode;

use papyre::error::Result;
use papyre::{BuildResult, Watcher};

use crate::config::{Settings, CONFIG_FILE};

mod config;

mod flags {
    use std::path::PathBuf;

    xflags::xflags! {
        /// Compile Luau templates and render a content tree with them.
        cmd papyre {
            /// Build the site once and write it to the output directory.
            cmd build {
                /// Configuration file. Defaults to `papyre.toml`.
                optional -c, --config config: PathBuf
                /// Output directory, overriding the configuration.
                optional -o, --out out: PathBuf
                /// Log debug output.
                optional -v, --verbose
            }

            /// Build the site, then rebuild whenever a file changes.
            cmd watch {
                /// Configuration file. Defaults to `papyre.toml`.
                optional -c, --config config: PathBuf
                /// Output directory, overriding the configuration.
                optional -o, --out out: PathBuf
                /// Log debug output.
                optional -v, --verbose
            }
        }
    }
}

struct Options {
    config: PathBuf,
    out: Option<PathBuf>,
    verbose: bool,
}

impl Options {
    fn new(config: Option<PathBuf>, out: Option<PathBuf>, verbose: bool) -> Self {
        let config = config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        Options { config, out, verbose }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "papyre=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn settings(options: &Options) -> Result<Settings> {
    let mut settings = Settings::read(&options.config)?;
    if let Some(out) = &options.out {
        settings.output = out.clone();
    }

    Ok(settings)
}

async fn write(settings: &Settings, mut result: BuildResult) -> Result<()> {
    let entries = result.entries.iter_mut();
    papyre::rename_extensions(entries, &settings.rename);
    papyre::write_entries(&settings.output, &result.entries).await?;
    tracing::info!(entries = result.entries.len(), "{}", result.timing);
    Ok(())
}

async fn build(options: Options) -> Result<()> {
    let settings = settings(&options)?;
    let result = papyre::build(settings.bundler.clone()).await?;
    write(&settings, result).await
}

async fn watch(options: Options) -> Result<()> {
    let settings = settings(&options)?;
    let watcher = Watcher::start(settings.bundler.clone())?;

    let handle = watcher.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stopping");
        }

        handle.deinit();
    });

    let settings = &settings;
    watcher.run(move |result| async move {
        let written = match result {
            Ok(result) => write(settings, result).await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            tracing::error!(output = %settings.output.display(), "rebuild failed:\n{e}");
        }
    }).await;

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let flags = flags::Papyre::from_env_or_exit();
    let (options, watching) = match flags.subcommand {
        flags::PapyreCmd::Build(f) => (Options::new(f.config, f.out, f.verbose), false),
        flags::PapyreCmd::Watch(f) => (Options::new(f.config, f.out, f.verbose), true),
    };

    init_logging(options.verbose);
    let result = match watching {
        true => watch(options).await,
        false => build(options).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
