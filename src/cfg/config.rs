// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::{
    enums::{ImageCompression, MouseMode, StreamingVideo},
    logger::LogConfig,
};

/// Top-level layered configuration for a dispatcher/channel host process.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    /// Dispatcher queue sizing and worker pool hints.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    /// Channel-layer defaults (per-kind pipe depth, migration behavior).
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Smartcard character-device bridge sizing overrides.
    #[serde(default)]
    pub smartcard: SmartcardConfig,
    /// Fan-out policy defaults applied at startup.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Structured logging configuration.
    pub logging: LogConfig,
}

/// Dispatcher queue sizing and worker pool hints.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DispatcherConfig {
    /// Bounded-channel capacity for a single device's dispatch queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Upper bound on `max_monitors` unless a device overrides it lower.
    #[serde(default = "default_max_monitors")]
    pub max_monitors_default: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            queue_capacity: default_queue_capacity(),
            max_monitors_default: default_max_monitors(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_monitors() -> u32 {
    u32::MAX
}

/// Channel-layer defaults shared by every channel kind.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ChannelConfig {
    /// Maximum outbound pipe depth before a client is considered backed up.
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,
    /// Whether channels accept `MigrateData` pipe items by default.
    #[serde(default = "default_true")]
    pub migration_enabled: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            pipe_capacity: default_pipe_capacity(),
            migration_enabled: default_true(),
        }
    }
}

fn default_pipe_capacity() -> usize {
    512
}

fn default_true() -> bool {
    true
}

/// Smartcard character-device bridge sizing overrides.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SmartcardConfig {
    /// Initial read-buffer allocation, in bytes (doubles on growth).
    #[serde(default = "default_apdu_buf_size")]
    pub initial_buf_size: usize,
    /// Maximum number of reader slots in the global readers table.
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,
    /// Idle timeout before an unattached reader is logged as stuck.
    #[serde(default = "default_attach_timeout", with = "serde_secs")]
    pub attach_timeout: Duration,
}

impl Default for SmartcardConfig {
    fn default() -> Self {
        SmartcardConfig {
            initial_buf_size: default_apdu_buf_size(),
            max_readers: default_max_readers(),
            attach_timeout: default_attach_timeout(),
        }
    }
}

fn default_apdu_buf_size() -> usize {
    270
}

fn default_max_readers() -> u32 {
    10
}

fn default_attach_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Fan-out policy defaults applied at startup, before any client negotiates
/// an override.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PolicyConfig {
    /// Initial mouse-routing mode.
    #[serde(default = "default_mouse_mode")]
    pub mouse_mode: MouseMode,
    /// Initial image-compression mode.
    #[serde(default = "default_image_compression")]
    pub image_compression: ImageCompression,
    /// Initial streaming-video heuristic mode.
    #[serde(default = "default_streaming_video")]
    pub streaming_video: StreamingVideo,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            mouse_mode: default_mouse_mode(),
            image_compression: default_image_compression(),
            streaming_video: default_streaming_video(),
        }
    }
}

fn default_mouse_mode() -> MouseMode {
    MouseMode::Client
}

fn default_image_compression() -> ImageCompression {
    ImageCompression::AutoGlz
}

fn default_streaming_video() -> StreamingVideo {
    StreamingVideo::Filter
}

impl ServerConfig {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: ServerConfig =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            self.dispatcher.queue_capacity >= 1,
            "dispatcher.queue_capacity must be >= 1"
        );
        ensure!(
            self.dispatcher.max_monitors_default >= 1,
            "dispatcher.max_monitors_default must be >= 1"
        );
        ensure!(
            self.channel.pipe_capacity >= 1,
            "channel.pipe_capacity must be >= 1"
        );
        ensure!(
            self.smartcard.max_readers >= 1,
            "smartcard.max_readers must be >= 1"
        );
        ensure!(
            self.smartcard.initial_buf_size >= 1,
            "smartcard.initial_buf_size must be >= 1"
        );

        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
