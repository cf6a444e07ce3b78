use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loqa_transcribe::{
    create_router, AppState, AudioFile, Config, NatsClient, NatsResultPublisher,
    RecognizerFactory, SessionRegistry, TranscribeError, TranscriptionSession,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loqa-transcribe", version, about = "Streaming transcription sessions")]
struct Cli {
    /// Config file path (extension optional)
    #[arg(long, global = true, default_value = "config/loqa-transcribe")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP/websocket server
    Serve,

    /// Stream a 16-bit WAV file through a session and print the results
    TranscribeFile {
        path: PathBuf,

        /// Audio per chunk, in milliseconds
        #[arg(long, default_value_t = 100)]
        chunk_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::TranscribeFile { path, chunk_ms } => transcribe_file(cfg, path, chunk_ms).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    info!("Loqa Transcribe v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Recognizer backend: {:?}", cfg.recognizer.backend);

    let recognizer = RecognizerFactory::create(&cfg.recognizer).await?;
    let mut registry = SessionRegistry::new(cfg.sessions.clone(), recognizer);

    if cfg.results.publish_to_nats {
        let client = NatsClient::connect(&cfg.recognizer.nats_url)
            .await
            .context("Failed to connect result publisher to NATS")?;
        info!("Publishing results to {}.<session_id>", cfg.results.subject_prefix);
        registry = registry.with_sink(Arc::new(NatsResultPublisher::new(
            client,
            cfg.results.subject_prefix.clone(),
        )));
    }

    let registry = Arc::new(registry);
    let app = create_router(AppState::new(Arc::clone(&registry)));

    let addr = cfg.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down, stopping {} sessions", registry.len());
    registry.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn transcribe_file(cfg: Config, path: PathBuf, chunk_ms: u64) -> Result<()> {
    let mut audio = AudioFile::open(&path)?;
    if audio.channels > 1 && cfg.recognizer.channels == 1 {
        info!("Downmixing {} channels to mono", audio.channels);
        audio = audio.to_mono();
    }
    if !audio.matches_format(cfg.recognizer.sample_rate, cfg.recognizer.channels) {
        warn!(
            "Audio is {}Hz {}ch but the recognizer expects {}Hz {}ch",
            audio.sample_rate, audio.channels, cfg.recognizer.sample_rate, cfg.recognizer.channels
        );
    }

    let recognizer = RecognizerFactory::create(&cfg.recognizer).await?;
    let session = TranscriptionSession::new(cfg.sessions.clone(), Vec::new());
    let mut results = session.subscribe();
    session.start(recognizer)?;

    let printer = tokio::spawn(async move {
        while let Some(result) = results.next().await {
            if result.is_partial {
                print!("\r[partial] {}", result.transcript);
                let _ = std::io::stdout().flush();
            } else {
                println!("\r[final {:.2}] {}", result.confidence, result.transcript);
            }
        }
    });

    let chunks = audio.pcm_chunks(chunk_ms);
    info!(
        "Streaming {} chunks of {}ms from {}",
        chunks.len(),
        chunk_ms,
        path.display()
    );

    for chunk in chunks {
        loop {
            match session.enqueue(chunk.clone()).await {
                Ok(()) => break,
                Err(TranscribeError::Backpressure(_)) => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(e) => return Err(e).context("Failed to stream audio"),
            }
        }
    }

    let outcome = session.stop().await;
    let _ = printer.await;

    let final_result = outcome.context("Transcription failed")?;
    info!(
        "Session {} done: {} chars, confidence {:.2}",
        session.id(),
        final_result.transcript.len(),
        final_result.confidence
    );
    Ok(())
}
