mod cli;
mod console;

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use feedctl_core::{install_signal_handlers, Controller, ReloadError, Session};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::console::ConsoleView;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(&cli) {
        eprintln!("failed to open log file: {e:#}");
        return ExitCode::FAILURE;
    }
    install_signal_handlers();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fatal error");
            eprintln!("Fatal error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_directive()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| path.display().to_string())?;
            let _ = subscriber
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = subscriber.with_writer(std::io::stderr).try_init();
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let view = Arc::new(ConsoleView::new());
    let quiet = !cli.execute.is_empty();
    if !quiet {
        println!("Starting feedctl {}...", env!("CARGO_PKG_VERSION"));
    }

    let session = match Session::start(cli.startup_options(), view.clone()) {
        Ok(session) => session,
        Err(e) if e.is_fatal() => return Err(e.into()),
        Err(e) => {
            warn!(error = %e, "startup aborted");
            eprintln!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    info!(
        feeds = session.controller().store().len(),
        cache = %session.paths().cache_file.display(),
        "started"
    );

    if cli.vacuum {
        println!("Cleaning up cache thoroughly...");
        session.vacuum().context("vacuum failed")?;
        println!("done.");
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(path) = &cli.import_read {
        println!("Importing list of read articles...");
        let result = session.controller().import_read_information(path);
        session.release();
        let count = result?;
        println!("done ({count} articles).");
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(path) = &cli.export_read {
        println!("Exporting list of read articles...");
        let result = session.controller().export_read_information(path);
        session.release();
        let count = result?;
        println!("done ({count} articles).");
        return Ok(ExitCode::SUCCESS);
    }

    if quiet {
        let result = execute_commands(session.controller(), &cli.execute);
        session.release();
        result?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.refresh_on_start || session.controller().config().refresh_on_startup {
        let report = session.controller().reload_all(false);
        view.finish_status();
        match report {
            Ok(report) => debug!(?report, "startup reload done"),
            Err(ReloadError::Busy) => warn!("reload already running"),
            Err(e) => warn!(error = %e, "startup reload failed"),
        }
    }
    print_feed_list(session.controller());

    println!("Cleaning up cache...");
    match session.shutdown() {
        Ok(()) => println!("done."),
        Err(e) => println!("failed: {e}"),
    }
    Ok(ExitCode::SUCCESS)
}

fn execute_commands(controller: &Controller, commands: &[String]) -> anyhow::Result<()> {
    for command in commands {
        debug!(command = %command, "executing");
        match command.as_str() {
            "reload" => {
                controller.reload_all(true)?;
            }
            "print-unread" => {
                let unread = controller.cache().unread_count()?;
                println!("{unread} unread articles");
            }
            other => warn!(command = other, "unknown command"),
        }
    }
    Ok(())
}

fn print_feed_list(controller: &Controller) {
    let store = controller.store();
    for index in 0..store.len() {
        let line = store.with_feed(index, |feed| {
            let title = if feed.display_title().is_empty() {
                feed.url.as_str()
            } else {
                feed.display_title()
            };
            format!(
                "{:>4} ({:>3}/{:>3}) {}",
                index + 1,
                feed.unread_item_count(),
                feed.items.len(),
                title
            )
        });
        if let Some(line) = line {
            println!("{line}");
        }
    }
    let counts = controller.compute_unread_numbers();
    println!(
        "{} unread feeds, {} unread articles",
        counts.feeds, counts.articles
    );
}
