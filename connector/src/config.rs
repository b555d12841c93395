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
//! Connector configuration file.
//!
//! ```json
//! {
//!   "connector_id": "https://connector.example/",
//!   "listen_addr": "0.0.0.0:8080",
//!   "deployment_mode": "PRODUCTIVE_DEPLOYMENT",
//!   "daps": {
//!     "token_url": "https://daps.example/token",
//!     "jwks": [{ "url": "https://daps.example/jwks.json", "kid": "default" }]
//!   },
//!   "certificate_path": "connector.crt",
//!   "private_key_path": "connector.key"
//! }
//! ```

use std::{
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use ids_daps_client::DeploymentMode;
use ids_messaging::{multipart::DEFAULT_SIZE_LIMIT, version::DEFAULT_MODEL_VERSION};
use ids_sdk_token_validator::{jwks::JwksSource, profile::SecurityProfile};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::io::read_file;

/// Default inbound message path.
pub const DEFAULT_INBOUND_PATH: &str = "/api/ids/data";
/// Default port of the inbound endpoint.
pub const DEFAULT_PORT: u16 = 8080;

/// Connector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// `ids:issuerConnector` of outbound messages and `@id` of the self-description.
    pub connector_id: Url,
    /// `ids:senderAgent` of outbound messages. Defaults to the connector id.
    #[serde(default)]
    pub sender_agent: Option<Url>,
    /// Listen address of the inbound endpoint.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Path of the inbound endpoint.
    #[serde(default = "default_inbound_path")]
    pub inbound_path: String,
    /// Public URL of the inbound endpoint, announced in the self-description. Defaults to the
    /// listen address.
    #[serde(default)]
    pub access_url: Option<Url>,
    /// Deployment mode.
    #[serde(default)]
    pub deployment_mode: DeploymentMode,
    /// DAPS endpoints.
    pub daps: DapsConfig,
    /// PEM encoded connector certificate.
    pub certificate_path: PathBuf,
    /// PEM encoded private key of the connector.
    pub private_key_path: PathBuf,
    /// `ids:modelVersion` of outbound messages.
    #[serde(default = "default_model_version")]
    pub outbound_model_version: String,
    /// Accepted model versions of inbound messages. `*` matches any segment.
    #[serde(default = "default_inbound_model_versions")]
    pub inbound_model_versions: Vec<String>,
    /// Require the `referringConnector` claim of inbound DATs to match the issuer connector.
    #[serde(default)]
    pub referring_connector_check: bool,
    /// Request SHACL validation of inbound headers. Not supported, headers are passed through.
    #[serde(default)]
    pub shacl_validation: bool,
    /// Minimum security profile of inbound and response DATs.
    #[serde(default)]
    pub required_security_profile: Option<SecurityProfile>,
    /// Timeout of outbound HTTP requests (DAPS, JWKS, other connectors).
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Upper bound for a message handler call.
    #[serde(default)]
    pub handler_timeout_secs: Option<u64>,
    /// Maximum size of an inbound multipart body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
    /// `ids:title` of the self-description.
    #[serde(default = "default_title")]
    pub title: String,
    /// `ids:description` of the self-description.
    #[serde(default)]
    pub description: Option<String>,
}

/// DAPS endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DapsConfig {
    /// Token endpoint.
    pub token_url: Url,
    /// Key sources for DAT validation.
    #[serde(default)]
    pub jwks: Vec<JwksSource>,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
}

fn default_inbound_path() -> String {
    DEFAULT_INBOUND_PATH.to_string()
}

fn default_model_version() -> String {
    DEFAULT_MODEL_VERSION.to_string()
}

fn default_inbound_model_versions() -> Vec<String> {
    vec!["4.*.*".to_string()]
}

fn default_http_timeout_secs() -> u64 {
    5
}

fn default_max_body_bytes() -> u64 {
    DEFAULT_SIZE_LIMIT
}

fn default_title() -> String {
    "IDS Connector".to_string()
}

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file cannot be read or parsed.
    #[error("could not read configuration {path}: {source}")]
    Read {
        /// The file.
        path: PathBuf,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
    /// `TEST_DEPLOYMENT` is configured without being permitted.
    #[error("TEST_DEPLOYMENT is configured but not permitted (use --allow-test-deployment)")]
    TestDeploymentNotAllowed,
    /// Productive deployments need keys to validate DATs with.
    #[error("no JWKS source configured for PRODUCTIVE_DEPLOYMENT")]
    NoJwksSource,
    /// The inbound path is not absolute.
    #[error("inbound path must start with '/': {0}")]
    InvalidInboundPath(String),
    /// No inbound model version is accepted.
    #[error("no inbound model version configured")]
    NoInboundModelVersion,
}

impl ConnectorConfig {
    /// Reads and checks the configuration at `path`.
    pub async fn load(
        path: impl AsRef<Path>,
        allow_test_deployment: bool,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config: ConnectorConfig = read_file(path).await.map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        config.check(allow_test_deployment)?;
        Ok(config)
    }

    /// Checks the configuration. Test deployments are refused unless `allow_test_deployment`.
    pub fn check(&self, allow_test_deployment: bool) -> Result<(), ConfigError> {
        match self.deployment_mode {
            DeploymentMode::Test if !allow_test_deployment => {
                return Err(ConfigError::TestDeploymentNotAllowed);
            }
            DeploymentMode::Test => {}
            DeploymentMode::Productive if self.daps.jwks.is_empty() => {
                return Err(ConfigError::NoJwksSource);
            }
            DeploymentMode::Productive => {}
        }
        if !self.inbound_path.starts_with('/') {
            return Err(ConfigError::InvalidInboundPath(self.inbound_path.clone()));
        }
        if self.inbound_model_versions.is_empty() {
            return Err(ConfigError::NoInboundModelVersion);
        }
        Ok(())
    }

    /// The sender agent, defaulting to the connector id.
    pub fn sender_agent(&self) -> Url {
        self.sender_agent
            .clone()
            .unwrap_or_else(|| self.connector_id.clone())
    }

    /// Timeout of outbound HTTP requests.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Upper bound for a message handler call.
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    const MINIMAL: &str = r#"{
        "connector_id": "https://connector.example/",
        "daps": {
            "token_url": "https://daps.example/token",
            "jwks": [{ "url": "https://daps.example/jwks.json", "kid": "default" }]
        },
        "certificate_path": "connector.crt",
        "private_key_path": "connector.key"
    }"#;

    fn minimal() -> ConnectorConfig {
        serde_json::from_str(MINIMAL).unwrap()
    }

    #[test]
    fn should_apply_defaults() {
        let config = minimal();

        assert_eq!(config.deployment_mode, DeploymentMode::Productive);
        assert_eq!(config.inbound_path, DEFAULT_INBOUND_PATH);
        assert_eq!(config.listen_addr.port(), DEFAULT_PORT);
        assert_eq!(config.outbound_model_version, DEFAULT_MODEL_VERSION);
        assert_eq!(config.inbound_model_versions, vec!["4.*.*".to_string()]);
        assert_eq!(config.sender_agent(), config.connector_id);
        assert_eq!(config.http_timeout(), Duration::from_secs(5));
        assert_eq!(config.handler_timeout(), None);
        assert!(!config.referring_connector_check);
        assert!(config.required_security_profile.is_none());
        config.check(false).unwrap();
    }

    #[test]
    fn should_parse_security_profile_and_mode() {
        let mut value: serde_json::Value = serde_json::from_str(MINIMAL).unwrap();
        value["deployment_mode"] = "TEST_DEPLOYMENT".into();
        value["required_security_profile"] = "idsc:TRUST_SECURITY_PROFILE".into();

        let config: ConnectorConfig = serde_json::from_value(value).unwrap();

        assert_eq!(config.deployment_mode, DeploymentMode::Test);
        assert_eq!(
            config.required_security_profile,
            Some(SecurityProfile::Trust)
        );
    }

    #[test]
    fn test_deployment_must_be_permitted() {
        let config = ConnectorConfig {
            deployment_mode: DeploymentMode::Test,
            ..minimal()
        };

        assert!(matches!(
            config.check(false),
            Err(ConfigError::TestDeploymentNotAllowed)
        ));
        config.check(true).unwrap();
    }

    #[test]
    fn should_reject_inconsistent_settings() {
        let mut config = minimal();
        config.daps.jwks.clear();
        assert!(matches!(config.check(false), Err(ConfigError::NoJwksSource)));

        let config = ConnectorConfig {
            inbound_path: "api".to_string(),
            ..minimal()
        };
        assert!(matches!(
            config.check(false),
            Err(ConfigError::InvalidInboundPath(_))
        ));
    }

    #[test(tokio::test)]
    async fn should_load_from_file() {
        let path = std::env::temp_dir().join(format!("ids-connector-config-{}.json", std::process::id()));
        tokio::fs::write(&path, MINIMAL).await.unwrap();

        let loaded = ConnectorConfig::load(&path, false).await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(loaded.unwrap(), minimal());
        assert!(matches!(
            ConnectorConfig::load(path, false).await,
            Err(ConfigError::Read { .. })
        ));
    }
}
