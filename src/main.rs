use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use streamscribe::cli::Cli;
use streamscribe::{
    config, CaptureSession, MicSource, SessionChannel, SocketChannel, VisualizationFeed,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the status line.
    let default_filter = if cli.verbose {
        "streamscribe=debug"
    } else {
        "streamscribe=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = match &cli.config {
        Some(path) => config::load_settings_from(path),
        None => config::load_settings(),
    };
    cli.apply(&mut settings);

    log::info!("Streaming endpoint: {}", settings.endpoint);

    let channel = Arc::new(
        SocketChannel::connect(&settings.endpoint)
            .await
            .context("connecting to streaming endpoint")?,
    );
    let source = MicSource::new().context("binding the default input device")?;

    let (session, handle) = CaptureSession::new(
        Box::new(source),
        Arc::clone(&channel) as Arc<dyn SessionChannel>,
        settings.buffer_size,
    );
    handle.set_language(settings.language).await?;
    let driver = tokio::spawn(session.run());

    let feed = VisualizationFeed::new(settings.display_height);
    let status_line = tokio::spawn(feed.run(
        handle.stats(),
        channel.subscribe(),
        handle.subscribe_errors(),
        std::io::stdout(),
    ));

    eprintln!("Enter toggles streaming, `lang <code>` switches language, `q` or Ctrl-C quits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(input)) => {
                        let input = input.trim();
                        if input.eq_ignore_ascii_case("q") {
                            break;
                        }
                        if let Some(code) = input.strip_prefix("lang ") {
                            match code.trim().parse() {
                                Ok(code) => {
                                    settings.language = code;
                                    handle.set_language(code).await?;
                                }
                                Err(e) => log::warn!("{}", e),
                            }
                        } else {
                            handle.toggle().await?;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("Reading stdin failed: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Stop any live session, then give the socket writer a moment to
    // drain the queued stop notice before tearing the connection down.
    handle.shutdown().await.ok();
    let _ = driver.await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    channel.disconnect();
    status_line.abort();

    let save_result = match &cli.config {
        Some(path) => config::save_settings_to(path, &settings),
        None => config::save_settings(&settings),
    };
    if let Err(e) = save_result {
        log::warn!("Settings: {}", e);
    }

    println!();
    Ok(())
}
