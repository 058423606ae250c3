//! Persisted outcome of a computation, replayable onto the keyframe store.
//!
//! File layout, gzip compressed as a whole:
//!
//! ```text
//! magic "NCCH" | version u16 LE | payload length u64 LE | postcard payload
//! ```

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use log::{info, warn};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::slam::{
    frame::{AnswerState, KeyFrame},
    options::TrackingOptions,
};

pub const CACHE_MAGIC: &[u8; 4] = b"NCCH";
pub const CACHE_VERSION: u16 = 1;
pub const CACHE_EXTENSION: &str = "cache";
const HEADER_SIZE: usize = 4 + 2 + 8;

/// Cache failure conditions
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache file {0} does not exist")]
    Missing(PathBuf),

    /// Stream ended before the recorded content
    #[error("Cache file is truncated: {0}")]
    Truncated(String),

    #[error("Cache file is not a valid gzip stream: {0}")]
    Compression(String),

    /// Bad magic, unknown version or inconsistent header
    #[error("Invalid cache format: {0}")]
    InvalidFormat(String),

    #[error("Cache payload could not be decoded: {0}")]
    Decode(String),

    #[error("Cache payload could not be encoded: {0}")]
    Encode(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Outcome of one run, one entry per keyframe in every sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationResultCache {
    pub data_set_name: String,
    pub computation_time_ms: u64,
    pub options: TrackingOptions,
    /// Converter index the run used
    pub converter: usize,
    pub indices: Vec<usize>,
    pub used_status: Vec<bool>,
    pub estimation_matrices: Vec<Matrix4<f64>>,
    pub marker_matrices: Vec<Matrix4<f64>>,
    pub answer_states: Vec<AnswerState>,
}

impl ComputationResultCache {
    /// Snapshot of the keyframe state after a run.
    pub fn from_keyframes(
        data_set_name: impl Into<String>,
        computation_time_ms: u64,
        options: TrackingOptions,
        converter: usize,
        keyframes: &[KeyFrame],
    ) -> Self {
        Self {
            data_set_name: data_set_name.into(),
            computation_time_ms,
            options,
            converter,
            indices: keyframes.iter().map(|k| k.id).collect(),
            used_status: keyframes.iter().map(|k| k.used).collect(),
            estimation_matrices: keyframes.iter().map(|k| k.alignment_matrix).collect(),
            marker_matrices: keyframes.iter().map(|k| k.answer_alignment_matrix).collect(),
            answer_states: keyframes.iter().map(|k| k.answer_state).collect(),
        }
    }

    /// Write the recorded state back onto `keyframes`, returning how many entries were applied.
    ///
    /// Entries whose id lies outside the store are skipped.
    pub fn apply(&self, keyframes: &mut [KeyFrame]) -> usize {
        let mut applied = 0;

        for (i, &id) in self.indices.iter().enumerate() {
            let Some(keyframe) = keyframes.get_mut(id) else {
                warn!("cached frame {id} is outside of the {} loaded frames", keyframes.len());
                continue;
            };

            keyframe.id = id;
            if let Some(&used) = self.used_status.get(i) {
                keyframe.used = used;
            }
            if let Some(matrix) = self.estimation_matrices.get(i) {
                keyframe.alignment_matrix = *matrix;
            }
            if let Some(matrix) = self.marker_matrices.get(i) {
                keyframe.answer_alignment_matrix = *matrix;
            }
            keyframe.answer_state = self.answer_states.get(i).copied().unwrap_or_default();
            applied += 1;
        }

        applied
    }
}

/// `<data_dir>/Cache`
pub fn cache_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("Cache")
}

/// `<data_dir>/Cache/<data_set>_<timestamp>_<strategy>.cache`
pub fn cache_path(data_dir: &Path, data_set_name: &str, timestamp: u64, strategy: &str) -> PathBuf {
    cache_dir(data_dir).join(format!(
        "{data_set_name}_{timestamp}_{strategy}.{CACHE_EXTENSION}"
    ))
}

/// Cache files in `dir`, most recently modified first.
pub fn list_cache_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(CACHE_EXTENSION) {
            continue;
        }
        let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
        entries.push((modified, path));
    }

    // names carry the timestamp, they break ties between equal modification times
    entries.sort_by(|(ma, pa), (mb, pb)| mb.cmp(ma).then_with(|| pb.cmp(pa)));
    Ok(entries.into_iter().map(|(_, path)| path).collect())
}

/// Write `record` to `path`.
///
/// The stream is staged in a temporary file next to `path` and renamed over it once
/// complete, an interrupted save never leaves a partial `.cache` file behind.
pub fn save(path: &Path, record: &ComputationResultCache) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let payload =
        postcard::to_allocvec(record).map_err(|e| CacheError::Encode(e.to_string()))?;

    let mut encoder = GzEncoder::new(NamedTempFile::new_in(dir)?, Compression::default());
    encoder.write_all(CACHE_MAGIC)?;
    encoder.write_all(&CACHE_VERSION.to_le_bytes())?;
    encoder.write_all(&(payload.len() as u64).to_le_bytes())?;
    encoder.write_all(&payload)?;

    let staged = encoder.finish()?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| CacheError::Io(e.error))?;

    info!("saved computation cache to {}", path.display());
    Ok(())
}

pub fn load(path: &Path) -> Result<ComputationResultCache> {
    let mut compressed = Vec::new();
    match File::open(path) {
        Ok(mut file) => file.read_to_end(&mut compressed)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CacheError::Missing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    if compressed.is_empty() {
        return Err(CacheError::Truncated("empty file".into()));
    }

    let mut bytes = Vec::new();
    if let Err(e) = GzDecoder::new(compressed.as_slice()).read_to_end(&mut bytes) {
        return Err(match e.kind() {
            ErrorKind::UnexpectedEof => CacheError::Truncated(e.to_string()),
            ErrorKind::InvalidInput | ErrorKind::InvalidData => {
                CacheError::Compression(e.to_string())
            }
            _ => CacheError::Io(e),
        });
    }

    decode(&bytes)
}

fn decode(bytes: &[u8]) -> Result<ComputationResultCache> {
    if bytes.len() < HEADER_SIZE {
        return Err(CacheError::Truncated(format!(
            "{} bytes, header needs {HEADER_SIZE}",
            bytes.len()
        )));
    }

    let (magic, rest) = bytes.split_at(4);
    if magic != CACHE_MAGIC {
        return Err(CacheError::InvalidFormat(format!("bad magic {magic:?}")));
    }

    let (version, rest) = rest.split_at(2);
    let version = u16::from_le_bytes([version[0], version[1]]);
    if version != CACHE_VERSION {
        return Err(CacheError::InvalidFormat(format!(
            "unsupported version {version}"
        )));
    }

    let (length, payload) = rest.split_at(8);
    let mut length_bytes = [0u8; 8];
    length_bytes.copy_from_slice(length);
    let length = u64::from_le_bytes(length_bytes) as usize;

    if payload.len() < length {
        return Err(CacheError::Truncated(format!(
            "payload holds {} of {length} bytes",
            payload.len()
        )));
    }
    if payload.len() > length {
        return Err(CacheError::InvalidFormat(format!(
            "{} trailing bytes after payload",
            payload.len() - length
        )));
    }

    postcard::from_bytes(payload).map_err(|e| match e {
        postcard::Error::DeserializeUnexpectedEnd => CacheError::Truncated(e.to_string()),
        other => CacheError::Decode(other.to_string()),
    })
}
