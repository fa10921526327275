//! Bioxel volume - command-line import and resampling.

use clap::Parser;
use env_logger::{Builder, Env};
use log::{error, info, warn};
use std::process::ExitCode;

use bioxel_volume::{
    CancellationToken, cache::RawCacheWriter, cache_layer, config::Config, load_layer, save_project,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    let job = tokio::task::spawn_blocking(move || run(&config, token));
    match job.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) if e.is_cancelled() => {
            warn!("Cancelled");
            ExitCode::from(130)
        }
        Ok(Err(e)) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Worker failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, token: CancellationToken) -> bioxel_volume::Result<()> {
    let mut pipeline = config.pipeline().cancellation(token).progress(report());

    let mut layer = load_layer(&config.input, config.kind, &mut pipeline)?;
    info!(
        "Loaded {} ({:?}, {:?}) with bioxel size {:?}",
        layer.name(),
        layer.shape(),
        layer.dtype(),
        layer.bioxel_size()
    );

    if let Some(size) = config.target_bioxel_size() {
        layer.resize_to_bioxel_size(size, &mut pipeline.progress_sink())?;
        info!("Resampled to {:?}", layer.shape());
    }

    let layers = if config.split_labels {
        layer.split_labels(&mut pipeline.progress_sink())?
    } else {
        vec![layer]
    };

    if config.cache_dir.is_some() {
        for layer in &layers {
            cache_layer(layer, &mut RawCacheWriter, &mut pipeline)?;
        }
    }

    if let Some(output) = &config.output {
        save_project(output, &config.project_name(), &layers)?;
    }
    Ok(())
}

/// Log each new progress message once.
fn report() -> impl FnMut(f32, &str) -> bool + Send + 'static {
    let mut last = String::new();
    move |fraction: f32, message: &str| {
        if message != last {
            info!("{} ({:.0}%)", message, fraction * 100.0);
            last = message.to_string();
        }
        true
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "bioxel_volume=debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(filter));
    builder.format_timestamp_secs();
    builder.init();
}
