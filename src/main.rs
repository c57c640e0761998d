//! ftpsync - replace a remote FTP web root with a local build directory

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ftpsync::cli::{Cli, Command, DeployOpts, FixOpts};
use ftpsync::config::Settings;
use ftpsync::error::DeployError;
use ftpsync::frontmatter;
use ftpsync::logger::{Logger, MultiLogger, TextLogger};
use ftpsync::progress::{Progress, ProgressWriter};
use ftpsync::{deploy, FtpConnector, FtpOptions};

fn init_tracing(verbose: bool, writer: ProgressWriter) {
    let default = if verbose { "ftpsync=debug" } else { "ftpsync=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(writer),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    let show_progress = matches!(&cli.command, Command::Deploy(opts) if opts.progress);
    // Logs and the spinner share stderr
    let progress = Progress::new(show_progress);
    init_tracing(cli.verbose, progress.writer());

    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // 128 + SIGINT
        std::process::exit(130);
    }) {
        tracing::warn!("Could not install Ctrl-C handler: {}", e);
    }

    let code = match cli.command {
        Command::Deploy(opts) => match run_deploy(&opts, progress) {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!("FTP deployment failed: {}", e);
                e.exit_code()
            }
        },
        Command::FixFrontmatter(opts) => match run_fix(&opts) {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!("{:#}", e);
                1
            }
        },
    };
    std::process::exit(code);
}

fn run_deploy(opts: &DeployOpts, progress: Progress) -> Result<(), DeployError> {
    let file = match &opts.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let settings = opts.overrides().or(file);

    let mut journal = MultiLogger::new().with(progress);
    if let Some(path) = &opts.log_file {
        match TextLogger::new(path) {
            Ok(l) => journal = journal.with(l),
            Err(e) => tracing::warn!("Cannot open log file {}: {}", path.display(), e),
        }
    }
    let journal: &dyn Logger = &journal;

    let report = deploy(
        |name| std::env::var(name).ok(),
        settings,
        |cfg| FtpConnector::new(FtpOptions::from(cfg)),
        journal,
    )?;

    if !report.clean.failures.is_empty() {
        tracing::warn!(
            "{} remote entries could not be removed",
            report.clean.failures.len()
        );
    }
    tracing::info!(
        "FTP deployment successful: {} files, {} bytes",
        report.upload.files_uploaded,
        report.upload.bytes_uploaded
    );
    Ok(())
}

fn run_fix(opts: &FixOpts) -> Result<()> {
    let stats = frontmatter::fix_tree(&opts.root, &opts.ext)?;
    tracing::info!(
        "Scanned {} files, fixed {}",
        stats.scanned,
        stats.changed
    );
    if !stats.errors.is_empty() {
        anyhow::bail!("{} files could not be processed", stats.errors.len());
    }
    Ok(())
}
