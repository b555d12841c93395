// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Observability crate for IDS connectors: logging setup and HTTP request tracing.

use std::{
    io::IsTerminal,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use http::Request;
use rand::{RngCore, SeedableRng, rng};
use rand_chacha::ChaChaRng;
use thiserror::Error;
use tower_http::{
    LatencyUnit,
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{DefaultOnFailure, DefaultOnResponse, MakeSpan, TraceLayer},
};
use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{EnvFilter, Registry, fmt::time::UtcTime, prelude::*};

/// Environment variable to define the log level.
pub const LOG_LEVEL_ENV: &str = "RUST_LOG";

const FALLBACK_EXEC_NAME: &str = "ids-connector";

/// Output format of the stderr logger.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines, colored if stderr is a terminal.
    #[default]
    Text,
    /// Bunyan formatted JSON records.
    Json,
}

/// Logging configuration.
#[derive(Debug, Default, Clone)]
pub struct TracingConfig {
    /// If set, debug level logs are written to `<log_dir>/<executable>.log`.
    pub log_dir: Option<PathBuf>,
    /// If true, logs at the `RUST_LOG` level are written to stderr.
    pub log_to_stderr: bool,
    /// Format of the stderr output.
    pub stderr_format: LogFormat,
}

/// Errors while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingSetupError {
    /// A global subscriber was already installed.
    #[error("global tracing subscriber already set: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the global tracing subscriber.
///
/// The returned guards flush the non-blocking writers on drop and must be held for as long as
/// logging is needed.
pub fn setup_tracing(config: &TracingConfig) -> Result<Vec<WorkerGuard>, TracingSetupError> {
    let mut guards = vec![];
    let mut layers = vec![JsonStorageLayer.boxed()];

    if let Some(log_dir) = &config.log_dir {
        let log_file =
            tracing_appender::rolling::never(log_dir, format!("{}.log", extract_exec_name()));
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(log_file);
        let file_logger = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(non_blocking_writer)
            .with_filter(tracing::level_filters::LevelFilter::DEBUG);
        layers.push(file_logger.boxed());
        guards.push(file_guard);
    }

    if config.log_to_stderr {
        let log_level =
            EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        let stderr_logger = match config.stderr_format {
            LogFormat::Text => {
                tracing_subscriber::fmt::layer()
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(non_blocking_writer)
                    .with_filter(log_level)
                    .boxed()
            }
            LogFormat::Json => {
                BunyanFormattingLayer::new(extract_exec_name(), non_blocking_writer)
                    .with_filter(log_level)
                    .boxed()
            }
        };
        layers.push(stderr_logger);
        guards.push(guard);
    }

    let subscriber = Registry::default().with(layers);
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::debug!("Logging initialized!");
    Ok(guards)
}

/// Trace layer that logs at info level and uses random span ids.
pub fn info_trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RandomSpans> {
    let lvl = tracing::Level::INFO;
    let trace_id_seed = rng().next_u64();
    let latency_unit = LatencyUnit::Micros;

    TraceLayer::new_for_http()
        .make_span_with(RandomSpans::new(trace_id_seed))
        .on_failure(
            DefaultOnFailure::new()
                .latency_unit(latency_unit)
                .level(lvl),
        )
        .on_response(
            DefaultOnResponse::new()
                .latency_unit(latency_unit)
                .level(lvl),
        )
}

/// Random span generator.
#[derive(Clone)]
pub struct RandomSpans {
    rng: Arc<Mutex<ChaChaRng>>,
}

impl RandomSpans {
    fn new(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaChaRng::seed_from_u64(seed))),
        }
    }

    fn next_span_id(&self) -> u64 {
        // A poisoned RNG is still a usable RNG.
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.next_u64()
    }
}

impl<B> MakeSpan<B> for RandomSpans {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let span_id = format!("{:016x}", self.next_span_id());
        tracing::span!(
            tracing::Level::INFO,
            "ids_request",
            span_id = span_id,
            method = %request.method(),
            uri = %request.uri(),
            content_type = ?request.headers().get(http::header::CONTENT_TYPE),
        )
    }
}

/// Extract the name of the executable that is currently running.
fn extract_exec_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| {
            path.file_stem()
                .and_then(|name| name.to_str())
                .map(|name| name.to_string())
        })
        .unwrap_or_else(|| FALLBACK_EXEC_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_ids_are_deterministic_per_seed() {
        let a = RandomSpans::new(7);
        let b = RandomSpans::new(7);
        assert_eq!(a.next_span_id(), b.next_span_id());
        assert_ne!(a.next_span_id(), RandomSpans::new(8).next_span_id());
    }

    #[test]
    fn exec_name_is_never_empty() {
        assert!(!extract_exec_name().is_empty());
    }
}
