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
//! Validation of Dynamic Attribute Tokens (DATs) issued by a DAPS.
//!
//! A DAT is a compact JWS. [validator::DatValidator] checks it against a set of candidate
//! [keys::VerificationKey]s, which a [keys::KeyProvider] supplies. [jwks::JwksKeyProvider]
//! fetches them lazily from the DAPS JWKS endpoints.

pub mod claims;
pub mod jwks;
pub mod keys;
pub mod profile;
pub mod rules;
pub mod validator;
