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
//! File helpers.

use std::path::Path;

use serde::de::DeserializeOwned;
use tokio::{fs::File, io::AsyncReadExt};

/// Reads the file at `path` and deserializes it from JSON.
pub async fn read_file<P, T>(path: P) -> std::io::Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let buf = read_bytes(path).await?;
    serde_json::from_slice(&buf).map_err(std::io::Error::other)
}

/// Reads the file at `path`. The error names the path.
pub async fn read_bytes(path: impl AsRef<Path>) -> std::io::Result<Vec<u8>> {
    let path = path.as_ref();
    let mut buf = Vec::new();
    File::open(path)
        .await
        .map_err(|e| std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))?
        .read_to_end(&mut buf)
        .await?;
    Ok(buf)
}
