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
//! IDS multipart messaging.
//!
//! Inbound messages flow through the [controller::MessageController]: the multipart body is split
//! by the [multipart::MultipartCodec], the header is decoded into a [message::Message], its model
//! version is checked and the [dispatcher::MessageDispatcher] validates the DAT, runs the
//! pre-dispatch filters and invokes the registered handler. The result is turned into a multipart
//! response by the [response::ResponseAssembler].
//!
//! Outbound messages are sent with the [sender::MessageSender].

pub mod controller;
pub mod dispatcher;
pub mod filter;
pub mod handler;
pub mod header;
pub mod identity;
pub mod message;
pub mod multipart;
pub mod payload;
pub mod rejection;
pub mod response;
pub mod sender;
pub mod version;

pub use ids_daps_client::DeploymentMode;
