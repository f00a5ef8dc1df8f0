// Copyright 2025-2026 CEMAXECUTER LLC

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use crossbeam::channel;

use sh_sdr::bb::BbConfig;
use sh_sdr::fake::FakeSdk;
use sh_sdr::file::{IqFileReader, IqFileWriter, SampleFormat};
use sh_sdr::sm::SmConfig;
use sh_sdr::sp::SpConfig;
use sh_sdr::vsg::VsgConfig;
use sh_sdr::{
    Complex32, Control, FatalPolicy, Family, RxDevice, Sink, SinkAdapter, Source, SourceAdapter,
    TxDevice,
};

use crate::config::AppConfig;

pub enum BlockKind {
    Source(Box<dyn Source>),
    Sink(Box<dyn Sink>),
}

/// An opened block plus the handle control threads use to retune it.
pub struct Block {
    pub kind: BlockKind,
    pub control: Arc<dyn Control>,
}

impl Block {
    pub fn source<D: RxDevice + 'static>(
        device: D,
        config: D::Config,
        purge: bool,
        policy: FatalPolicy,
    ) -> Self {
        let adapter = SourceAdapter::new(device, config, purge).with_policy(policy);
        let control: Arc<dyn Control> = Arc::new(adapter.controls());
        Self {
            kind: BlockKind::Source(Box::new(adapter)),
            control,
        }
    }

    pub fn sink<D: TxDevice + 'static>(device: D, config: D::Config, policy: FatalPolicy) -> Self {
        let adapter = SinkAdapter::new(device, config).with_policy(policy);
        let control: Arc<dyn Control> = Arc::new(adapter.controls());
        Self {
            kind: BlockKind::Sink(Box::new(adapter)),
            control,
        }
    }
}

fn not_built(family: Family) -> anyhow::Error {
    anyhow::anyhow!(
        "{} support not compiled in (rebuild with --features {})",
        family,
        feature_name(family)
    )
}

fn feature_name(family: Family) -> &'static str {
    match family {
        Family::Bb60 => "bb",
        Family::Sp145 => "sp",
        Family::Sm200 => "sm",
        Family::Vsg60 => "vsg",
    }
}

/// Serial numbers of attached devices of `family`.
pub fn list_devices(family: Family, fake: bool) -> anyhow::Result<Vec<u32>> {
    if fake {
        return Ok(vec![sh_sdr::fake::FAKE_SERIAL]);
    }
    match family {
        #[cfg(feature = "bb")]
        Family::Bb60 => Ok(sh_sdr::bb::list_devices()?),
        #[cfg(feature = "sp")]
        Family::Sp145 => Ok(sh_sdr::sp::list_devices()?),
        #[cfg(feature = "sm")]
        Family::Sm200 => Ok(sh_sdr::sm::list_devices()?),
        #[cfg(feature = "vsg")]
        Family::Vsg60 => Ok(sh_sdr::vsg::list_devices()?),
        #[allow(unreachable_patterns)]
        other => Err(not_built(other)),
    }
}

/// Open the configured device and wrap it in its block.
pub fn open_block(family: Family, config: &AppConfig) -> anyhow::Result<Block> {
    let policy = config.on_fatal;
    let purge = config.purge;
    if purge && family.is_sink() {
        bail!("purge only applies to receivers, not the {}", family);
    }

    if config.fake {
        log::info!("using fake {} SDK", family);
        let block = match family {
            Family::Bb60 => Block::source(FakeSdk::<BbConfig>::new().open()?, config.bb.clone(), purge, policy),
            Family::Sp145 => Block::source(FakeSdk::<SpConfig>::new().open()?, config.sp.clone(), purge, policy),
            Family::Sm200 => Block::source(FakeSdk::<SmConfig>::new().open()?, config.sm.clone(), purge, policy),
            Family::Vsg60 => Block::sink(FakeSdk::<VsgConfig>::new().open()?, config.vsg.clone(), policy),
        };
        return Ok(block);
    }

    match family {
        #[cfg(feature = "bb")]
        Family::Bb60 => Ok(Block::source(
            sh_sdr::bb::BbDevice::open(config.serial)?,
            config.bb.clone(),
            purge,
            policy,
        )),
        #[cfg(feature = "sp")]
        Family::Sp145 => Ok(Block::source(
            sh_sdr::sp::SpDevice::open(config.serial)?,
            config.sp.clone(),
            purge,
            policy,
        )),
        #[cfg(feature = "sm")]
        Family::Sm200 => Ok(Block::source(
            sh_sdr::sm::SmDevice::open(config.serial)?,
            config.sm.clone(),
            purge,
            policy,
        )),
        #[cfg(feature = "vsg")]
        Family::Vsg60 => Ok(Block::sink(
            sh_sdr::vsg::VsgDevice::open(config.serial)?,
            config.vsg.clone(),
            policy,
        )),
        #[allow(unreachable_patterns)]
        other => Err(not_built(other)),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunStats {
    pub blocks: u64,
    pub samples: u64,
}

fn report(what: &str, stats: &RunStats, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    let rate = if elapsed > 0.0 {
        stats.samples as f64 / elapsed / 1e6
    } else {
        0.0
    };
    log::info!(
        "{} done ({:.1}s): {} blocks, {} samples, {:.2} MS/s",
        what,
        elapsed,
        stats.blocks,
        stats.samples,
        rate
    );
}

/// Pull blocks from a source until `blocks` is reached or `running` drops.
/// With `output` set, blocks are recorded as cf32 by a writer thread.
pub fn run_source(
    source: &mut dyn Source,
    block_size: usize,
    blocks: Option<u64>,
    output: Option<&Path>,
    running: &AtomicBool,
) -> anyhow::Result<RunStats> {
    let mut recorder = match output {
        Some(path) => {
            let mut writer = IqFileWriter::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let (tx, rx) = channel::bounded::<Vec<Complex32>>(64);
            let thread = std::thread::spawn(move || -> sh_sdr::Result<u64> {
                for block in rx.iter() {
                    writer.write(&block)?;
                }
                writer.finish()
            });
            Some((tx, thread))
        }
        None => None,
    };

    let start = Instant::now();
    let mut stats = RunStats::default();
    let mut buf = vec![Complex32::default(); block_size];
    let mut result = Ok(());

    while running.load(Ordering::Relaxed) && blocks.map_or(true, |n| stats.blocks < n) {
        match source.work(&mut buf) {
            Ok(n) => {
                stats.blocks += 1;
                stats.samples += n as u64;
                if let Some((ref tx, _)) = recorder {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break; // writer failed
                    }
                }
            }
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    if let Some((tx, thread)) = recorder.take() {
        drop(tx);
        let written = match thread.join() {
            Ok(r) => r.context("recording failed")?,
            Err(_) => bail!("writer thread panicked"),
        };
        result?;
        log::info!("recorded {} samples", written);
    } else {
        result?;
    }
    report("source", &stats, start);
    Ok(stats)
}

/// Feed a sink from an I/Q file until EOF or `running` drops.
pub fn run_sink(
    sink: &mut dyn Sink,
    input: &Path,
    format: SampleFormat,
    block_size: usize,
    running: &AtomicBool,
) -> anyhow::Result<RunStats> {
    let reader = IqFileReader::new(input, format, block_size);
    let reader_running = reader.running_flag();

    let (tx, rx) = channel::bounded(64);
    let reader_thread = std::thread::spawn(move || reader.stream(tx));

    let start = Instant::now();
    let mut stats = RunStats::default();
    let mut result = Ok(());

    for block in rx.iter() {
        if !running.load(Ordering::Relaxed) {
            break;
        }
        match sink.work(&block) {
            Ok(n) => {
                stats.blocks += 1;
                stats.samples += n as u64;
            }
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }
    reader_running.store(false, Ordering::SeqCst);
    drop(rx);

    match reader_thread.join() {
        Ok(r) => {
            r.with_context(|| format!("failed to read {}", input.display()))?;
        }
        Err(_) => bail!("reader thread panicked"),
    }
    result?;
    report("sink", &stats, start);
    Ok(stats)
}
