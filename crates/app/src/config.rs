// Copyright 2025-2026 CEMAXECUTER LLC

//! Optional TOML run configuration. Command-line flags override it.

use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;

use sh_sdr::bb::BbConfig;
use sh_sdr::sm::SmConfig;
use sh_sdr::sp::SpConfig;
use sh_sdr::vsg::VsgConfig;
use sh_sdr::{FatalPolicy, Family};

pub const DEFAULT_BLOCK_SIZE: usize = 16384;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub device: Option<Family>,
    pub serial: Option<u32>,
    /// Drive an in-process fake SDK instead of hardware.
    pub fake: bool,
    pub block_size: Option<usize>,
    /// Source blocks to stream before exiting; unset runs until stopped.
    pub blocks: Option<u64>,
    /// Receivers discard device-buffered samples before each read.
    pub purge: bool,
    pub on_fatal: FatalPolicy,
    pub bb: BbConfig,
    pub sp: SpConfig,
    pub sm: SmConfig,
    pub vsg: VsgConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        if config.block_size == Some(0) {
            bail!("block_size must be at least 1");
        }
        Ok(config)
    }

    pub fn block_size(&self) -> usize {
        self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE)
    }
}

pub fn parse_policy(s: &str) -> anyhow::Result<FatalPolicy> {
    match s.to_ascii_lowercase().as_str() {
        "propagate" | "error" => Ok(FatalPolicy::Propagate),
        "abort" => Ok(FatalPolicy::Abort),
        other => bail!("unknown fatal policy '{}' (use propagate or abort)", other),
    }
}
