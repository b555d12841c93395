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
//! Connector CLI options.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// IDS connector
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Opts {
    /// Top-level subcommand
    #[command(subcommand)]
    pub command: Commands,

    /// Logging options
    #[command(flatten)]
    pub logging: LoggingOptions,
}

/// Logging options.
#[derive(Debug, Args)]
pub struct LoggingOptions {
    /// Log to stderr.
    #[arg(long, global = true)]
    pub stderr: bool,

    /// Log as JSON instead of plain text on stderr.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Directory for the connector log.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the connector.
    Run {
        /// The connector configuration file (JSON).
        #[arg(long)]
        config: PathBuf,

        /// Permit `TEST_DEPLOYMENT` in the configuration. Inbound DATs are then not validated.
        #[arg(long)]
        allow_test_deployment: bool,
    },
    /// Print the DAPS client id of a connector certificate.
    Fingerprint {
        /// PEM encoded connector certificate.
        #[arg(long)]
        certificate: PathBuf,
    },
}
