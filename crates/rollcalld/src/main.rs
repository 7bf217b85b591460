use anyhow::{Context, Result};
use clap::Parser;
use rollcall_core::{Debouncer, Outcome, RecognitionPipeline, SharedRegistry};
use rollcall_store::{Config, RegistryStore};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

mod engine;
mod observation;

use engine::{EngineError, EngineHandle};
use observation::{AttendanceRecord, Observation};

#[derive(Parser)]
#[command(name = "rollcalld", about = "rollcall recognition daemon")]
struct Args {
    /// Observation streams (JSON lines), one per camera. Reads stdin if none.
    inputs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load().context("loading configuration")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rollcalld starting");

    let pipeline = RecognitionPipeline::new(
        config.feature_builder()?,
        SharedRegistry::default(),
        Debouncer::new(config.log_interval()),
        config.similarity_threshold,
    );
    let engine = engine::spawn_engine(pipeline, RegistryStore::new(&config.registry_dir))
        .context("starting recognition engine")?;

    let mut streams = JoinSet::new();
    if args.inputs.is_empty() {
        let engine = engine.clone();
        streams.spawn(async move {
            run_stream(engine, "stdin".to_string(), BufReader::new(tokio::io::stdin())).await
        });
    }
    for path in args.inputs {
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let engine = engine.clone();
        streams.spawn(async move { run_stream(engine, name, BufReader::new(file)).await });
    }

    tracing::info!(streams = streams.len(), "rollcalld ready");

    loop {
        tokio::select! {
            joined = streams.join_next() => {
                let Some(joined) = joined else { break };
                // A stream error (e.g. registry/query shape mismatch) halts matching.
                if let Err(e) = joined.context("stream task panicked")? {
                    streams.abort_all();
                    return Err(e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                streams.abort_all();
                break;
            }
        }
    }

    tracing::info!("rollcalld shutting down");
    Ok(())
}

/// Feed one observation stream through the engine until EOF.
async fn run_stream<R>(engine: EngineHandle, default_stream: String, reader: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let obs = match Observation::parse(&line) {
            Ok(obs) => obs,
            Err(e) => {
                tracing::warn!(stream = %default_stream, line = line_no, error = %e, "skipping malformed observation");
                continue;
            }
        };

        if obs.reload {
            match engine.reload().await {
                Ok(count) => tracing::info!(identities = count, "registry reload requested"),
                Err(e) => tracing::error!(error = %e, "registry reload failed; keeping previous registry"),
            }
            continue;
        }

        let stream = obs.stream.clone().unwrap_or_else(|| default_stream.clone());
        let now_ms = obs.timestamp_ms_or_now();

        let recognition = match engine.observe(obs.detection(), now_ms).await {
            Ok(r) => r,
            Err(EngineError::Pipeline(rollcall_core::PipelineError::Feature(e))) => {
                tracing::warn!(stream = %stream, line = line_no, error = %e, "skipping observation");
                continue;
            }
            Err(e) => {
                tracing::error!(stream = %stream, line = line_no, error = %e, "recognition halted");
                return Err(e.into());
            }
        };

        match &recognition.outcome {
            Outcome::Logged(candidate) => {
                let record = AttendanceRecord::new(candidate, now_ms, &stream);
                println!("{}", serde_json::to_string(&record)?);
            }
            Outcome::Suppressed(candidate) => {
                tracing::debug!(stream = %stream, name = %candidate.name, "already logged within interval");
            }
            Outcome::Unknown { best } => {
                tracing::debug!(
                    stream = %stream,
                    best = ?best.as_ref().map(|c| (&c.name, c.similarity)),
                    "no identity above threshold"
                );
            }
            Outcome::NoFace => {
                tracing::trace!(stream = %stream, "no face");
            }
        }
    }

    tracing::info!(stream = %default_stream, lines = line_no, "stream ended");
    Ok(())
}
