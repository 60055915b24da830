//! Notifier that writes user-facing messages to the log
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


use crate::collaborators::Notifier;
use async_trait::async_trait;
use relay_types::{DestinationId, NotifyError};
use tracing::{info, warn};

/// Stand-in for a chat platform: every message becomes a log event
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_start(
        &self,
        destination: DestinationId,
        caption: &str,
        thumbnail: Option<&str>,
    ) -> Result<(), NotifyError> {
        info!(
            destination = %destination,
            caption = caption,
            thumbnail = thumbnail.unwrap_or("-"),
            "Stream started"
        );
        Ok(())
    }

    async fn notify_error(&self, destination: DestinationId, message: &str) -> Result<(), NotifyError> {
        warn!(destination = %destination, message = message, "Stream error");
        Ok(())
    }
}
