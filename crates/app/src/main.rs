// Copyright 2025-2026 CEMAXECUTER LLC

mod config;
mod control;
mod pipeline;

use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use sh_sdr::file::SampleFormat;
use sh_sdr::{Family, Param};

use config::AppConfig;
use control::ControlServer;
use pipeline::BlockKind;

#[derive(Parser, Debug)]
#[command(name = "signal-hound")]
#[command(about = "Stream I/Q from or to Signal Hound BB60, SP145, SM200/SM435 and VSG60 hardware")]
struct Cli {
    /// Device family: bb, sp, sm or vsg
    #[arg(short = 'd', long)]
    device: Option<Family>,

    /// TOML run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Open the unit with this serial number instead of the first one found
    #[arg(long)]
    serial: Option<u32>,

    /// List attached devices of the selected family and exit
    #[arg(short = 'l', long)]
    list: bool,

    /// Use the built-in fake SDK instead of hardware
    #[arg(long)]
    fake: bool,

    /// Center frequency in Hz
    #[arg(short = 'c', long)]
    center: Option<f64>,

    /// Reference level in dBm (receivers)
    #[arg(long)]
    reflevel: Option<f64>,

    /// I/Q decimation (receivers)
    #[arg(long)]
    decimation: Option<i32>,

    /// I/Q bandwidth in Hz (receivers)
    #[arg(short = 'b', long)]
    bandwidth: Option<f64>,

    /// Sample rate in Hz (generator)
    #[arg(long)]
    samplerate: Option<f64>,

    /// Output level in dBm (generator)
    #[arg(long)]
    level: Option<f64>,

    /// Discard device-buffered samples before each read
    #[arg(long)]
    purge: bool,

    /// Any other parameter as name=value (repeatable), e.g. atten=10
    #[arg(short = 's', long = "set")]
    set: Vec<Param>,

    /// Samples per block
    #[arg(long)]
    block_size: Option<usize>,

    /// Number of source blocks to stream (default: until stopped)
    #[arg(short = 'n', long)]
    blocks: Option<u64>,

    /// Record source output to this cf32 file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// I/Q file to play through the generator
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    /// Sample format of --input: ci8, ci16, cf32
    #[arg(long, default_value = "cf32")]
    format: SampleFormat,

    /// On a fatal device error: propagate (stop with an error) or abort
    #[arg(long)]
    on_fatal: Option<String>,

    /// Accept JSON control commands on stdin
    #[arg(long)]
    control: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    /// Tuning flags in the order they are applied.
    fn params(&self) -> Vec<Param> {
        let mut params = Vec::new();
        params.extend(self.center.map(Param::Center));
        params.extend(self.reflevel.map(Param::RefLevel));
        params.extend(self.decimation.map(Param::Decimation));
        params.extend(self.bandwidth.map(Param::Bandwidth));
        params.extend(self.samplerate.map(Param::SampleRate));
        params.extend(self.level.map(Param::Level));
        params.extend(self.set.iter().copied());
        params
    }

    /// Fold flags over the file configuration.
    fn merge(&self, mut config: AppConfig) -> anyhow::Result<AppConfig> {
        if self.device.is_some() {
            config.device = self.device;
        }
        if self.serial.is_some() {
            config.serial = self.serial;
        }
        if self.fake {
            config.fake = true;
        }
        if self.purge {
            config.purge = true;
        }
        if let Some(n) = self.block_size {
            if n == 0 {
                bail!("--block-size must be at least 1");
            }
            config.block_size = Some(n);
        }
        if self.blocks.is_some() {
            config.blocks = self.blocks;
        }
        if let Some(ref policy) = self.on_fatal {
            config.on_fatal = config::parse_policy(policy)?;
        }
        Ok(config)
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let file_config = match cli.config {
        Some(ref path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let config = cli.merge(file_config)?;
    let family = config
        .device
        .context("no device selected (use --device or set `device` in the config file)")?;

    if cli.list {
        let serials = pipeline::list_devices(family, config.fake)?;
        if serials.is_empty() {
            println!("no {} devices found", family);
        }
        for serial in serials {
            println!("{} serial {}", family, serial);
        }
        return Ok(());
    }

    let block = pipeline::open_block(family, &config)?;
    for param in cli.params() {
        block
            .control
            .set(param)
            .with_context(|| format!("--{}", param.name()))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    if cli.control {
        let server = ControlServer::new(block.control.clone(), running.clone());
        // Detached: the thread sits in a blocking stdin read.
        std::thread::spawn(move || {
            server.run(io::stdin().lock(), BufWriter::new(io::stdout()));
        });
    }

    let block_size = config.block_size();
    match block.kind {
        BlockKind::Source(mut source) => {
            if cli.input.is_some() {
                bail!("--input only applies to the VSG60 generator");
            }
            pipeline::run_source(
                source.as_mut(),
                block_size,
                config.blocks,
                cli.output.as_deref(),
                &running,
            )?;
        }
        BlockKind::Sink(mut sink) => {
            let input = cli
                .input
                .as_deref()
                .context("the VSG60 generator needs --input <file>")?;
            pipeline::run_sink(sink.as_mut(), input, cli.format, block_size, &running)?;
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
