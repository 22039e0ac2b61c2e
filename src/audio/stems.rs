//! Stem vocabulary, stem sets, and the separation collaborator
//!
//! Stems are a closed four-variant vocabulary rather than runtime string
//! keys: the resolver produces sets over [`Stem`], so the mix path never does
//! a string lookup.
//!
//! The separation model itself is external. [`Separator`] is the seam; the
//! shipped implementation shells out to a separation command (spleeter-style)
//! that writes one WAV per stem, which are then decoded back through the
//! normal decode path.

use crate::audio::decode;
use crate::audio::types::AudioSource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// One isolated musical component of a mixed track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stem {
    Vocals,
    Drums,
    Bass,
    Other,
}

impl Stem {
    /// All stems, in canonical order.
    pub const ALL: [Stem; 4] = [Stem::Vocals, Stem::Drums, Stem::Bass, Stem::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Other => "other",
        }
    }
}

impl FromStr for Stem {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "vocals" => Ok(Stem::Vocals),
            "drums" => Ok(Stem::Drums),
            "bass" => Ok(Stem::Bass),
            "other" => Ok(Stem::Other),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Stem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mono PCM buffers for all four stems of one track.
///
/// Invariant: every buffer has the same frame count and sample rate, equal to
/// the source track's. Produced once by the separator, read-only thereafter.
#[derive(Debug, Clone)]
pub struct StemSet {
    buffers: HashMap<Stem, Vec<f32>>,
    sample_rate: u32,
    frames: usize,
}

impl StemSet {
    /// Build a stem set, enforcing the equal-length / equal-rate invariant.
    pub fn new(buffers: HashMap<Stem, Vec<f32>>, sample_rate: u32) -> Result<Self> {
        for stem in Stem::ALL {
            if !buffers.contains_key(&stem) {
                return Err(Error::Separation(format!("missing stem buffer: {}", stem)));
            }
        }
        let frames = buffers[&Stem::Vocals].len();
        for stem in Stem::ALL {
            let len = buffers[&stem].len();
            if len != frames {
                return Err(Error::Separation(format!(
                    "stem length mismatch: {} has {} frames, vocals has {}",
                    stem, len, frames
                )));
            }
        }
        Ok(Self {
            buffers,
            sample_rate,
            frames,
        })
    }

    pub fn get(&self, stem: Stem) -> &[f32] {
        &self.buffers[&stem]
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

/// Seam for the stem-separation model.
///
/// Implementations take the original track and return four equal-length mono
/// stem buffers at the track's sample rate.
#[async_trait]
pub trait Separator: Send + Sync {
    async fn separate(&self, source_path: &Path, source: &AudioSource) -> Result<StemSet>;
}

/// Separator that shells out to an external separation command.
///
/// Invocation: `<cmd> <input-file> -o <output-dir>`. The command is expected
/// to write `<output-dir>/<track-stem>/{vocals,drums,bass,other}.wav`
/// (the layout spleeter's 4-stem model produces). Stems are decoded with the
/// same symphonia path as the source and downmixed to mono.
pub struct CommandSeparator {
    command: String,
}

impl CommandSeparator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn stem_dir(output_dir: &Path, source_path: &Path) -> PathBuf {
        let base = source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        output_dir.join(base)
    }
}

#[async_trait]
impl Separator for CommandSeparator {
    async fn separate(&self, source_path: &Path, source: &AudioSource) -> Result<StemSet> {
        let output_dir = std::env::temp_dir().join(format!("stemcast-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| Error::Separation(format!("cannot create stem dir: {}", e)))?;

        info!(
            "Running separation command: {} {} -o {}",
            self.command,
            source_path.display(),
            output_dir.display()
        );

        let status = tokio::process::Command::new(&self.command)
            .arg(source_path)
            .arg("-o")
            .arg(&output_dir)
            .status()
            .await
            .map_err(|e| {
                Error::Separation(format!("cannot launch '{}': {}", self.command, e))
            })?;

        if !status.success() {
            let _ = std::fs::remove_dir_all(&output_dir);
            return Err(Error::Separation(format!(
                "'{}' exited with {}",
                self.command, status
            )));
        }

        let stem_dir = Self::stem_dir(&output_dir, source_path);
        let result = load_stem_dir(&stem_dir, source);

        if let Err(e) = std::fs::remove_dir_all(&output_dir) {
            warn!("Failed to remove stem dir {}: {}", output_dir.display(), e);
        }
        result
    }
}

/// Load `{vocals,drums,bass,other}.wav` from a directory into a StemSet,
/// checking each stem against the source's rate and frame count.
pub fn load_stem_dir(dir: &Path, source: &AudioSource) -> Result<StemSet> {
    let mut buffers = HashMap::new();

    for stem in Stem::ALL {
        let path = dir.join(format!("{}.wav", stem));
        let decoded = decode::decode(&path)
            .map_err(|e| Error::Separation(format!("cannot load stem {}: {}", stem, e)))?;

        if decoded.sample_rate != source.sample_rate {
            return Err(Error::Separation(format!(
                "stem {} sample rate {} does not match source rate {}",
                stem, decoded.sample_rate, source.sample_rate
            )));
        }

        debug!("Loaded stem {}: {} frames", stem, decoded.frames());
        buffers.insert(stem, downmix_mono(&decoded));
    }

    let set = StemSet::new(buffers, source.sample_rate)?;
    if set.frames() != source.frames() {
        return Err(Error::Separation(format!(
            "stem frame count {} does not match source frame count {}",
            set.frames(),
            source.frames()
        )));
    }
    Ok(set)
}

/// Average all channels of a decoded buffer into mono.
fn downmix_mono(source: &AudioSource) -> Vec<f32> {
    let ch = source.channels as usize;
    if ch == 1 {
        return source.samples.clone();
    }
    source
        .samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}
