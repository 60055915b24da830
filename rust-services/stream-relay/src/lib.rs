//! Stream Relay Library
//!
//! Per-destination live stream scheduling:
//! - FIFO job queue per destination
//! - At most one encoder process per destination
//! - Stop / skip with graceful termination and forced kill
//! - Temp file cleanup and queue progression on every exit
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


pub mod cleanup;
pub mod collaborators;
pub mod command;
pub mod console;
pub mod notifier;
pub mod queue;
pub mod resolver;
pub mod runner;
pub mod stats;
mod state;
mod supervisor;

pub use collaborators::{DirectUrlResolver, MediaResolver, Notifier, OutcomeRecorder, ResolvedMedia};
pub use command::EncodeCommand;
pub use console::{Command, Console};
pub use notifier::LogNotifier;
pub use queue::QueueManager;
pub use resolver::DestinationResolver;
pub use runner::StreamRunner;
pub use state::NowPlaying;
pub use stats::{MemoryStatsStore, UserStats};
