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
//! IDS connector binary.

use anyhow::Context;
use clap::Parser;
use ids_connector::{
    cli::{Commands, LoggingOptions, Opts},
    config::ConnectorConfig,
    io::read_bytes,
    runtime::{ConnectorRuntime, spawn_signal_handler},
};
use ids_daps_client::fingerprint::fingerprint_from_pem;
use ids_messaging::{filter::FilterChain, handler::HandlerRegistry};
use ids_sdk_observability::{LogFormat, TracingConfig, setup_tracing};
use ids_sdk_token_validator::validator::DatValidator;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    let _guards = setup_tracing(&tracing_config(&opts.logging))?;

    match opts.command {
        Commands::Run {
            config,
            allow_test_deployment,
        } => {
            let config = ConnectorConfig::load(&config, allow_test_deployment).await?;
            let cancellation_token = CancellationToken::new();
            let signals = spawn_signal_handler(cancellation_token.clone());

            let runtime = ConnectorRuntime::start(
                &config,
                HandlerRegistry::new(),
                FilterChain::new(),
                DatValidator::new(),
                cancellation_token,
            )
            .await?;
            tracing::info!(url = %runtime.inbound_url(), "Connector ready");

            runtime.join().await?;
            signals.abort();
            Ok(())
        }
        Commands::Fingerprint { certificate } => {
            let pem = read_bytes(&certificate).await?;
            let fingerprint = fingerprint_from_pem(&pem)
                .with_context(|| format!("no fingerprint for {}", certificate.display()))?;
            println!("{fingerprint}");
            Ok(())
        }
    }
}

fn tracing_config(logging: &LoggingOptions) -> TracingConfig {
    TracingConfig {
        log_dir: logging.log_dir.clone(),
        log_to_stderr: logging.stderr,
        stderr_format: if logging.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Text
        },
    }
}
