//! Encoder command construction
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


use relay_types::{MediaSource, StreamKind};
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;

// Output parameters expected by live ingest endpoints. Changing any of these
// (especially the keyframe interval) causes visible stalls on most platforms.
pub const VIDEO_WIDTH: u32 = 1280;
pub const VIDEO_HEIGHT: u32 = 720;
pub const VIDEO_FPS: u32 = 30;
pub const VIDEO_BITRATE: &str = "2000k";
pub const VIDEO_MAXRATE: &str = "2000k";
pub const VIDEO_BUFSIZE: &str = "4000k";
pub const KEYFRAME_INTERVAL: u32 = 30;
pub const AUDIO_BITRATE: &str = "128k";
pub const AUDIO_CHANNELS: u32 = 2;
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Quiet output plus minimal probing and buffering on the input side
const LOW_LATENCY_INPUT_ARGS: &[&str] = &[
    "-hide_banner", "-loglevel", "error",
    "-fflags", "nobuffer", "-flags", "low_delay",
    "-probesize", "32", "-analyzeduration", "0",
];

/// Fully described invocation of the external transcoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeCommand {
    program: String,
    args: Vec<String>,
}

impl EncodeCommand {
    /// Build the argument set for streaming `source` to `ingest_url`
    pub fn build(source: &MediaSource, kind: StreamKind, ingest_url: &str) -> Self {
        let input = source.input();
        let mut args: Vec<String> = LOW_LATENCY_INPUT_ARGS.iter().map(|a| a.to_string()).collect();

        match kind {
            StreamKind::Full => {
                // Read at native frame rate so the relay stays live
                args.extend(["-re".to_string(), "-i".to_string(), input]);
                args.extend(video_args());
            }
            StreamKind::AudioOnly => {
                args.extend(["-i".to_string(), input, "-vn".to_string()]);
            }
        }

        args.extend(audio_args());
        args.extend([
            "-flvflags".to_string(),
            "no_duration_filesize".to_string(),
            "-f".to_string(),
            "flv".to_string(),
            ingest_url.to_string(),
        ]);

        Self {
            program: "ffmpeg".to_string(),
            args,
        }
    }

    /// Use a different encoder binary (path or name)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Push target, always the last argument
    pub fn ingest_url(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }

    /// Process builder with stdout discarded and stderr captured for diagnostics
    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl fmt::Display for EncodeCommand {
    /// Renders the command line with the stream key masked
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        let last = self.args.len().saturating_sub(1);
        for (idx, arg) in self.args.iter().enumerate() {
            if idx == last {
                write!(f, " {}", redact_ingest_url(arg))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

fn video_args() -> Vec<String> {
    let keyint = KEYFRAME_INTERVAL.to_string();
    vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "ultrafast".to_string(),
        "-tune".to_string(),
        "zerolatency".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        VIDEO_BITRATE.to_string(),
        "-maxrate".to_string(),
        VIDEO_MAXRATE.to_string(),
        "-bufsize".to_string(),
        VIDEO_BUFSIZE.to_string(),
        "-g".to_string(),
        keyint.clone(),
        "-keyint_min".to_string(),
        keyint,
        "-vf".to_string(),
        format!("scale={}:{},fps={}", VIDEO_WIDTH, VIDEO_HEIGHT, VIDEO_FPS),
    ]
}

fn audio_args() -> Vec<String> {
    vec![
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        AUDIO_BITRATE.to_string(),
        "-ac".to_string(),
        AUDIO_CHANNELS.to_string(),
        "-ar".to_string(),
        AUDIO_SAMPLE_RATE.to_string(),
    ]
}

/// Replace everything after the last `/` with `***`
fn redact_ingest_url(url: &str) -> String {
    match url.rfind('/') {
        Some(idx) if idx + 1 < url.len() => format!("{}/***", &url[..idx]),
        _ => url.to_string(),
    }
}
