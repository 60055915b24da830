//! Release of job-owned temp files
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use relay_types::{CleanupError, MediaSource};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Delete the temp file backing `source`, if the job owns one.
///
/// Consumes the source so a file can only be released once. Remote URLs are
/// left alone. Failures are logged and never propagated.
pub async fn release_source(source: MediaSource) {
    if let MediaSource::TempFile(path) = source {
        if let Err(e) = remove_temp_file(&path).await {
            warn!(error = %e, "Temp file cleanup failed");
        }
    }
}

async fn remove_temp_file(path: &Path) -> Result<(), CleanupError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Temp file removed");
            Ok(())
        }
        // Already gone counts as released
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CleanupError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}
