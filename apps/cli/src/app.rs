//! Command dispatch.

use std::path::Path;
use std::time::Duration;

use dropcast_transfer::UploadRequest;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;

use crate::args::{Cli, Cmd, InitConfigArgs, UploadArgs};
use crate::config::Config;

/// Progress bar resolution (fractions are scaled to this many steps).
const BAR_STEPS: u64 = 1000;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.cmd {
        Cmd::Upload(args) => upload(config_path, args).await,
        Cmd::InitConfig(args) => init_config(config_path, args),
        Cmd::Check => check(config_path),
    }
}

async fn upload(config_path: Option<&Path>, args: UploadArgs) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;

    let request = match args.name {
        Some(name) => UploadRequest::with_remote_name(&args.file, name)?,
        None => UploadRequest::new(&args.file)?,
    };

    let mut orchestrator = config.orchestrator();
    if let Some(secs) = args.timeout {
        orchestrator = orchestrator.with_timeout(Some(Duration::from_secs(secs)));
    }

    let handle = orchestrator.spawn(config.transfer.clone(), request);
    tracing::info!(upload_id = %handle.id(), file = %args.file.display(), "upload queued");

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling upload");
            cancel.cancel();
        }
    });

    let bar = progress_bar(args.quiet);
    let render = tokio::spawn(render_progress(handle.progress(), bar.clone()));

    let outcome = handle.outcome().await;
    // The progress sender is gone once the upload task ends, so this returns.
    let _ = render.await;

    match outcome {
        Ok(url) => {
            bar.finish_and_clear();
            println!("{url}");
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            Err(e.into())
        }
    }
}

fn init_config(config_path: Option<&Path>, args: InitConfigArgs) -> anyhow::Result<()> {
    let path = Config::write_template(config_path, args.force)?;
    println!("wrote {}", path.display());
    Ok(())
}

fn check(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    config.transfer.validate()?;
    println!(
        "ok: {}@{}:{}{} -> {}",
        config.transfer.username,
        config.transfer.host,
        config.transfer.port,
        config.transfer.normalized_remote_path(),
        config.transfer.normalized_base_url(),
    );
    Ok(())
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(BAR_STEPS);
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {elapsed}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Mirrors the upload's progress value onto the bar until the upload ends.
async fn render_progress(mut progress: watch::Receiver<f64>, bar: ProgressBar) {
    while progress.changed().await.is_ok() {
        let fraction = *progress.borrow_and_update();
        bar.set_position(to_steps(fraction));
    }
}

fn to_steps(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_STEPS as f64).round() as u64
}
