// Copyright 2025-2026 CEMAXECUTER LLC

//! I/Q sample files: feeding a sink from disk and recording a source.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::Sender;
use num_complex::Complex32;

use crate::error::{Error, Result};

/// IQ sample format on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Complex int8 (CS8): pairs of i8
    Ci8,
    /// Complex int16 (CS16): pairs of i16, little-endian
    Ci16,
    /// Complex float32 (CF32): pairs of f32, little-endian
    Cf32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Ci8 => 2,
            SampleFormat::Ci16 => 4,
            SampleFormat::Cf32 => 8,
        }
    }

    fn decode(self, raw: &[u8]) -> Complex32 {
        match self {
            SampleFormat::Ci8 => Complex32::new(
                raw[0] as i8 as f32 / 128.0,
                raw[1] as i8 as f32 / 128.0,
            ),
            SampleFormat::Ci16 => Complex32::new(
                i16::from_le_bytes([raw[0], raw[1]]) as f32 / 32768.0,
                i16::from_le_bytes([raw[2], raw[3]]) as f32 / 32768.0,
            ),
            SampleFormat::Cf32 => Complex32::new(
                f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
                f32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            ),
        }
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ci8" | "cs8" => Ok(SampleFormat::Ci8),
            "ci16" | "cs16" => Ok(SampleFormat::Ci16),
            "cf32" | "fc32" => Ok(SampleFormat::Cf32),
            other => Err(Error::InvalidParam(format!(
                "unknown sample format: {} (use ci8, ci16, or cf32)",
                other
            ))),
        }
    }
}

/// Reads I/Q blocks from a file and sends them down a channel.
pub struct IqFileReader {
    path: PathBuf,
    format: SampleFormat,
    /// Number of complex samples per block
    block_size: usize,
    running: Arc<AtomicBool>,
}

impl IqFileReader {
    pub fn new(path: impl Into<PathBuf>, format: SampleFormat, block_size: usize) -> Self {
        Self {
            path: path.into(),
            format,
            block_size: block_size.max(1),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Read up to `num_samples`, returning None at end of file. A trailing
    /// partial sample is dropped.
    fn read_block<R: Read>(&self, reader: &mut R, num_samples: usize) -> io::Result<Option<Vec<Complex32>>> {
        let width = self.format.bytes_per_sample();
        let mut buf = vec![0u8; num_samples * width];
        let mut filled = 0;
        while filled < buf.len() {
            let n = reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let samples = filled / width;
        if samples == 0 {
            return Ok(None);
        }
        Ok(Some(
            buf[..samples * width]
                .chunks_exact(width)
                .map(|raw| self.format.decode(raw))
                .collect(),
        ))
    }

    /// Stream the whole file (blocking) until EOF, `stop()`, or the
    /// receiver hangs up. Returns the number of samples sent.
    pub fn stream(&self, tx: Sender<Vec<Complex32>>) -> Result<u64> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::with_capacity(1024 * 1024, file);

        self.running.store(true, Ordering::SeqCst);
        log::info!(
            "reading IQ from {} ({:?}, {} samples per block)",
            self.path.display(),
            self.format,
            self.block_size
        );

        let mut sent = 0u64;
        while self.running.load(Ordering::SeqCst) {
            match self.read_block(&mut reader, self.block_size)? {
                Some(block) => {
                    let n = block.len() as u64;
                    if tx.send(block).is_err() {
                        break; // receiver dropped
                    }
                    sent += n;
                }
                None => {
                    log::info!("end of file: {}", self.path.display());
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(sent)
    }
}

/// Writes complex float32 samples (CF32, little-endian).
pub struct IqFileWriter {
    writer: BufWriter<File>,
    written: u64,
}

impl IqFileWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write(&mut self, samples: &[Complex32]) -> Result<()> {
        for s in samples {
            self.writer.write_all(&s.re.to_le_bytes())?;
            self.writer.write_all(&s.im.to_le_bytes())?;
        }
        self.written += samples.len() as u64;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;

    #[test]
    fn test_cf32_written_then_streamed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.cf32");

        let samples: Vec<Complex32> = (0..10).map(|i| Complex32::new(i as f32 * 0.1, -0.5)).collect();
        let mut w = IqFileWriter::create(&path).unwrap();
        w.write(&samples).unwrap();
        assert_eq!(w.finish().unwrap(), 10);

        let reader = IqFileReader::new(&path, SampleFormat::Cf32, 4);
        let (tx, rx) = channel::bounded(8);
        assert_eq!(reader.stream(tx).unwrap(), 10);

        let blocks: Vec<Vec<Complex32>> = rx.iter().collect();
        assert_eq!(blocks.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(blocks.concat(), samples);
    }

    #[test]
    fn test_ci16_scaling_and_partial_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iq.ci16");
        let mut raw = Vec::new();
        for v in [16384i16, -32768, 0, 8192] {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        raw.push(0x7f); // trailing partial sample
        std::fs::write(&path, &raw).unwrap();

        let reader = IqFileReader::new(&path, SampleFormat::Ci16, 16);
        let (tx, rx) = channel::unbounded();
        reader.stream(tx).unwrap();
        let block = rx.recv().unwrap();
        assert_eq!(block, vec![Complex32::new(0.5, -1.0), Complex32::new(0.0, 0.25)]);
    }

    #[test]
    fn test_ci8_decode() {
        assert_eq!(
            SampleFormat::Ci8.decode(&[64u8, 0x80]),
            Complex32::new(0.5, -1.0)
        );
    }

    #[test]
    fn test_format_names() {
        assert_eq!("cf32".parse::<SampleFormat>().unwrap(), SampleFormat::Cf32);
        assert_eq!("cs8".parse::<SampleFormat>().unwrap(), SampleFormat::Ci8);
        assert!("u8".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn test_missing_file() {
        let reader = IqFileReader::new("/nonexistent/iq.cf32", SampleFormat::Cf32, 16);
        let (tx, _rx) = channel::bounded(1);
        assert!(matches!(reader.stream(tx), Err(Error::Io(_))));
    }
}
