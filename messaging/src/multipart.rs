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
//! IDS multipart wire format.
//!
//! A message is a `multipart/form-data` body with a `header` part holding the JSON-LD header and
//! an optional `payload` part. The codec knows nothing about message semantics.

use std::{convert::Infallible, string::FromUtf8Error};

use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use multer::{Constraints, Multipart, SizeLimit};
use rand::{Rng, distr::Alphanumeric};
use thiserror::Error;
use tracing::debug;

/// Name of the header part.
pub const HEADER_PART: &str = "header";
/// Name of the payload part.
pub const PAYLOAD_PART: &str = "payload";
/// Content type of the header part.
pub const HEADER_CONTENT_TYPE: &str = "application/ld+json";
/// Default limit for a whole multipart body.
pub const DEFAULT_SIZE_LIMIT: u64 = 16 * 1024 * 1024;

const BOUNDARY_LEN: usize = 32;

/// The parts of an IDS multipart message, header first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartMap {
    /// The header part.
    pub header: String,
    /// The payload part, if present.
    pub payload: Option<Bytes>,
}

/// Multipart decoding errors.
#[derive(Debug, Error)]
pub enum MultipartError {
    /// The content type carries no usable boundary.
    #[error("invalid multipart content type: {0}")]
    InvalidBoundary(#[source] multer::Error),
    /// The body is not a well formed multipart stream.
    #[error("malformed multipart body: {0}")]
    Framing(#[source] multer::Error),
    /// The body exceeds the size limit of the codec.
    #[error("multipart body exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit.
        limit: u64,
    },
    /// The header part is not UTF-8.
    #[error("header part is not UTF-8: {0}")]
    HeaderNotUtf8(#[from] FromUtf8Error),
    /// There is no header part.
    #[error("multipart body has no header part")]
    MissingHeader,
}

/// Parses and builds IDS multipart bodies.
#[derive(Debug, Clone, Copy)]
pub struct MultipartCodec {
    size_limit: u64,
}

impl Default for MultipartCodec {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_LIMIT)
    }
}

impl MultipartCodec {
    /// Creates a codec that refuses bodies larger than `size_limit` bytes.
    pub fn new(size_limit: u64) -> Self {
        Self { size_limit }
    }

    /// The body size limit.
    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    /// Splits `body` into header and payload. `content_type` must carry the boundary.
    pub async fn parse(&self, content_type: &str, body: Bytes) -> Result<MultipartMap, MultipartError> {
        let stream = futures::stream::once(async move { Ok::<_, Infallible>(body) });
        self.parse_stream(content_type, stream).await
    }

    /// Like [MultipartCodec::parse], reading the body from `stream`. Reading stops with
    /// [MultipartError::TooLarge] once more than the limit arrived.
    pub async fn parse_stream<S, E>(
        &self,
        content_type: &str,
        stream: S,
    ) -> Result<MultipartMap, MultipartError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let boundary = multer::parse_boundary(content_type).map_err(MultipartError::InvalidBoundary)?;
        let constraints =
            Constraints::new().size_limit(SizeLimit::new().whole_stream(self.size_limit));
        let mut multipart = Multipart::with_constraints(stream, boundary, constraints);
        let framing = |e: multer::Error| match e {
            multer::Error::StreamSizeExceeded { limit } => MultipartError::TooLarge { limit },
            e => MultipartError::Framing(e),
        };

        let mut header = None;
        let mut payload = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(framing)?
        {
            let name = field.name().map(str::to_string);
            let content = field.bytes().await.map_err(framing)?;
            match name.as_deref() {
                Some(HEADER_PART) if header.is_none() => header = Some(content),
                Some(PAYLOAD_PART) if payload.is_none() => payload = Some(content),
                other => debug!(part = ?other, "Ignoring multipart part"),
            }
        }

        let header = header.ok_or(MultipartError::MissingHeader)?;
        Ok(MultipartMap {
            header: String::from_utf8(header.to_vec())?,
            payload,
        })
    }

    /// Encodes `map`. Returns the content type, including the boundary, and the body.
    pub fn build(&self, map: &MultipartMap) -> (String, Bytes) {
        let boundary: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(BOUNDARY_LEN)
            .map(char::from)
            .collect();

        let mut body = BytesMut::new();
        write_part(
            &mut body,
            &boundary,
            HEADER_PART,
            Some(HEADER_CONTENT_TYPE),
            map.header.as_bytes(),
        );
        if let Some(payload) = &map.payload {
            write_part(&mut body, &boundary, PAYLOAD_PART, None, payload);
        }
        body.put_slice(format!("--{boundary}--\r\n").as_bytes());

        (
            format!("multipart/form-data; boundary={boundary}"),
            body.freeze(),
        )
    }
}

fn write_part(
    body: &mut BytesMut,
    boundary: &str,
    name: &str,
    content_type: Option<&str>,
    content: &[u8],
) {
    body.put_slice(format!("--{boundary}\r\n").as_bytes());
    body.put_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n").as_bytes());
    if let Some(content_type) = content_type {
        body.put_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    }
    body.put_slice(format!("Content-Length: {}\r\n\r\n", content.len()).as_bytes());
    body.put_slice(content);
    body.put_slice(b"\r\n");
}
