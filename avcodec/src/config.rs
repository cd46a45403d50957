// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration and descriptor path resolution.
//!
//! This module provides the location of the platform capability descriptor
//! and the tunables a [`crate::CodecSession`] uses when none are given
//! explicitly.

use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

/// Location of the capability descriptor on a device image.
pub const DEFAULT_CAPS_PATH: &str = "/etc/codec/codec_caps.xml";

/// Environment variable overriding [`DEFAULT_CAPS_PATH`].
pub const CAPS_PATH_ENV: &str = "AVCODEC_CAPS_PATH";

/// Returns the path of the capability descriptor.
///
/// The `AVCODEC_CAPS_PATH` environment variable takes precedence over
/// [`DEFAULT_CAPS_PATH`].
///
/// # Examples
///
/// ```no_run
/// use avcodec::{CapabilityList, config::get_caps_path};
///
/// # fn main() -> Result<(), avcodec::Error> {
/// let list = CapabilityList::load(get_caps_path())?;
/// # Ok(())
/// # }
/// ```
pub fn get_caps_path() -> PathBuf {
    match std::env::var_os(CAPS_PATH_ENV) {
        Some(path) if !path.is_empty() => path.into(),
        _ => PathBuf::from(DEFAULT_CAPS_PATH),
    }
}

/// Session tunables.
///
/// Every field has a default, so a partial JSON document is accepted:
///
/// ```
/// use avcodec::config::CodecConfig;
///
/// let config: CodecConfig = serde_json::from_str(r#"{"pull_timeout_ms": 20}"#).unwrap();
/// assert_eq!(config.pull_timeout().as_millis(), 20);
/// assert_eq!(config.input_buffer_count, 4);
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CodecConfig {
    /// Capability descriptor path.
    pub caps_path: PathBuf,
    /// Timeout applied by pulls that do not pass their own.
    pub pull_timeout_ms: u64,
    /// How long to wait for the driver to acknowledge a command.
    pub command_timeout_ms: u64,
    pub input_buffer_count: usize,
    pub output_buffer_count: usize,
    /// Byte alignment of internally allocated raw frame buffers.
    pub buffer_alignment: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            caps_path: get_caps_path(),
            pull_timeout_ms: 100,
            command_timeout_ms: 1000,
            input_buffer_count: 4,
            output_buffer_count: 4,
            buffer_alignment: 16,
        }
    }
}

impl CodecConfig {
    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the file cannot be read and
    /// [`crate::Error::Json`] if it is not a valid configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        debug!("Loaded codec configuration from {}", path.display());
        Ok(config)
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
