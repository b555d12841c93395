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
//! Connector fingerprint, the DAPS client id.
//!
//! The fingerprint is `<SKI>:keyid:<AKI>`, where SKI and AKI are the subject and authority key
//! identifiers of the connector certificate, each written as uppercase hex octets separated by
//! `:`.

use der::{Decode, DecodePem, oid::AssociatedOid};
use thiserror::Error;
use x509_cert::{
    Certificate,
    ext::pkix::{AuthorityKeyIdentifier, SubjectKeyIdentifier},
};

/// Fingerprint errors.
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// The certificate is not valid PEM or DER.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(#[from] der::Error),
    /// A required extension is missing.
    #[error("certificate has no {0} extension")]
    MissingExtension(&'static str),
}

/// Computes the fingerprint of a PEM encoded certificate.
pub fn fingerprint_from_pem(pem: &[u8]) -> Result<String, FingerprintError> {
    let cert = Certificate::from_pem(pem)?;
    fingerprint(&cert)
}

/// Computes the fingerprint of a certificate.
pub fn fingerprint(cert: &Certificate) -> Result<String, FingerprintError> {
    let extensions = cert
        .tbs_certificate
        .extensions
        .as_deref()
        .unwrap_or_default();

    let mut ski = None;
    let mut aki = None;
    for ext in extensions {
        if ext.extn_id == SubjectKeyIdentifier::OID {
            let value = SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes())?;
            ski = Some(hex_octets(value.0.as_bytes()));
        } else if ext.extn_id == AuthorityKeyIdentifier::OID {
            let value = AuthorityKeyIdentifier::from_der(ext.extn_value.as_bytes())?;
            aki = value.key_identifier.map(|id| hex_octets(id.as_bytes()));
        }
    }

    let ski = ski.ok_or(FingerprintError::MissingExtension("SubjectKeyIdentifier"))?;
    let aki = aki.ok_or(FingerprintError::MissingExtension("AuthorityKeyIdentifier"))?;
    Ok(format!("{ski}:keyid:{aki}"))
}

fn hex_octets(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
