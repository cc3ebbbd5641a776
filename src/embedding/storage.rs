// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk storage for vector indexes.
//!
//! An index is persisted as two aligned artifacts inside a generation
//! directory, plus a pointer file naming the live generation:
//!
//! ```text
//! <dir>/CURRENT                  "gen-000003"
//! <dir>/gen-000003/vectors.bin   header + count x dimension little-endian f32
//! <dir>/gen-000003/passages.json model id, dimension, count, passage records
//! ```
//!
//! `save` writes a complete new generation before swapping `CURRENT`, so a
//! failure at any point leaves the previous generation live and readable.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::chunker::Passage;
use super::index::VectorIndex;
use crate::errors::{Result, RetrievalError};

/// Pointer file naming the live generation.
pub const CURRENT_FILE: &str = "CURRENT";
/// Vector store file name inside a generation.
pub const VECTORS_FILE: &str = "vectors.bin";
/// Passage store file name inside a generation.
pub const PASSAGES_FILE: &str = "passages.json";

const GENERATION_PREFIX: &str = "gen-";
const VECTORS_MAGIC: &[u8; 8] = b"STRGVEC1";
const DEFAULT_KEEP_GENERATIONS: usize = 2;

#[derive(Serialize)]
struct PassageStoreRef<'a> {
    model_id: &'a str,
    dimension: usize,
    count: usize,
    passages: &'a [Passage],
}

#[derive(Deserialize)]
struct PassageStore {
    model_id: String,
    dimension: usize,
    count: usize,
    passages: Vec<Passage>,
}

struct VectorStore {
    model_id: String,
    dimension: usize,
    count: usize,
    created_at: i64,
    updated_at: i64,
    vectors: Vec<f32>,
}

/// Generation-based index storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
    keep_generations: usize,
}

impl IndexStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            keep_generations: DEFAULT_KEEP_GENERATIONS,
        }
    }

    /// Sets how many generations stay on disk, the live one included.
    pub fn with_keep_generations(mut self, keep: usize) -> Self {
        self.keep_generations = keep.max(1);
        self
    }

    /// Returns the index directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True when a generation pointer exists.
    pub fn exists(&self) -> bool {
        self.dir.join(CURRENT_FILE).is_file()
    }

    /// Returns the live generation number, or `None` if nothing was saved.
    pub fn current_generation(&self) -> Result<Option<u64>> {
        let pointer = self.dir.join(CURRENT_FILE);
        let content = match fs::read_to_string(&pointer) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RetrievalError::io(&pointer, e)),
        };
        parse_generation(content.trim())
            .map(Some)
            .ok_or_else(|| {
                RetrievalError::corrupt(&pointer, format!("invalid generation '{}'", content.trim()))
            })
    }

    /// Lists generation directories present on disk, ascending.
    pub fn generations(&self) -> Result<Vec<u64>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RetrievalError::io(&self.dir, e)),
        };

        let mut generations: Vec<u64> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().and_then(parse_generation))
            .collect();
        generations.sort_unstable();
        Ok(generations)
    }

    /// Persists `index` as a new generation and makes it live.
    pub fn save(&self, index: &VectorIndex) -> Result<u64> {
        fs::create_dir_all(&self.dir).map_err(|e| RetrievalError::io(&self.dir, e))?;

        let latest = self
            .generations()?
            .last()
            .copied()
            .max(self.current_generation()?)
            .unwrap_or(0);
        let generation = latest + 1;
        let gen_dir = self.generation_dir(generation);
        fs::create_dir(&gen_dir).map_err(|e| RetrievalError::io(&gen_dir, e))?;

        write_atomic(&gen_dir.join(VECTORS_FILE), &encode_vectors(index))?;

        let passages_path = gen_dir.join(PASSAGES_FILE);
        let passages_json = serde_json::to_vec(&PassageStoreRef {
            model_id: index.model_id(),
            dimension: index.dimension(),
            count: index.len(),
            passages: index.passages(),
        })
        .map_err(|e| RetrievalError::io(&passages_path, e.into()))?;
        write_atomic(&passages_path, &passages_json)?;

        let pointer = format!("{}\n", generation_name(generation));
        write_atomic(&self.dir.join(CURRENT_FILE), pointer.as_bytes())?;

        tracing::info!(
            generation,
            passages = index.len(),
            dir = %self.dir.display(),
            "saved index generation"
        );

        self.prune(generation);
        Ok(generation)
    }

    /// Loads the live generation.
    pub fn load(&self) -> Result<VectorIndex> {
        self.load_current().map(|(_, index)| index)
    }

    /// Loads the live generation and returns it with its number.
    ///
    /// `CURRENT` is read once, so the number always names the data returned.
    pub fn load_current(&self) -> Result<(u64, VectorIndex)> {
        let generation = self.current_generation()?.ok_or_else(|| {
            let pointer = self.dir.join(CURRENT_FILE);
            RetrievalError::io(
                pointer,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no index has been saved"),
            )
        })?;
        self.load_resolved(generation)
    }

    /// Loads `generation`, previously read from `CURRENT`.
    ///
    /// If it fails because a newer save pruned it in the meantime, `CURRENT`
    /// is read again and the generation it now names is loaded instead.
    pub fn load_resolved(&self, generation: u64) -> Result<(u64, VectorIndex)> {
        match self.load_generation(generation) {
            Ok(index) => Ok((generation, index)),
            Err(e) if !self.generation_dir(generation).is_dir() => {
                match self.current_generation()? {
                    Some(latest) if latest != generation => {
                        tracing::debug!(
                            pruned = generation,
                            latest,
                            "generation pruned while loading; retrying"
                        );
                        Ok((latest, self.load_generation(latest)?))
                    }
                    _ => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Loads one generation directory.
    pub fn load_generation(&self, generation: u64) -> Result<VectorIndex> {
        let gen_dir = self.generation_dir(generation);

        let vectors_path = gen_dir.join(VECTORS_FILE);
        let store = read_vectors(&vectors_path)?;

        let passages_path = gen_dir.join(PASSAGES_FILE);
        let file = File::open(&passages_path).map_err(|e| missing_is_corrupt(&passages_path, e))?;
        let passages: PassageStore = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| RetrievalError::corrupt(&passages_path, e.to_string()))?;

        if passages.count != passages.passages.len() {
            return Err(RetrievalError::corrupt(
                &passages_path,
                format!(
                    "header declares {} passages but {} are stored",
                    passages.count,
                    passages.passages.len()
                ),
            ));
        }
        if store.count != passages.count {
            return Err(RetrievalError::corrupt(
                &gen_dir,
                format!(
                    "vector store holds {} vectors but passage store holds {} passages",
                    store.count, passages.count
                ),
            ));
        }
        if store.dimension != passages.dimension {
            return Err(RetrievalError::corrupt(
                &gen_dir,
                format!(
                    "vector dimension {} disagrees with passage store dimension {}",
                    store.dimension, passages.dimension
                ),
            ));
        }
        if store.model_id != passages.model_id {
            return Err(RetrievalError::corrupt(
                &gen_dir,
                format!(
                    "vector model '{}' disagrees with passage store model '{}'",
                    store.model_id, passages.model_id
                ),
            ));
        }

        let index = VectorIndex::from_parts(
            store.model_id,
            store.dimension,
            store.vectors,
            passages.passages,
            store.created_at,
            store.updated_at,
        )
        .map_err(|reason| RetrievalError::corrupt(&gen_dir, reason))?;

        tracing::debug!(generation, passages = index.len(), "loaded index generation");
        Ok(index)
    }

    fn generation_dir(&self, generation: u64) -> PathBuf {
        self.dir.join(generation_name(generation))
    }

    /// Removes generations older than the newest `keep_generations`.
    fn prune(&self, live: u64) {
        let generations = match self.generations() {
            Ok(generations) => generations,
            Err(e) => {
                tracing::warn!("Failed to list index generations: {}", e);
                return;
            }
        };
        let cutoff = generations.len().saturating_sub(self.keep_generations);
        for &generation in &generations[..cutoff] {
            if generation == live {
                continue;
            }
            let dir = self.generation_dir(generation);
            if let Err(e) = fs::remove_dir_all(&dir) {
                tracing::warn!("Failed to remove {}: {}", dir.display(), e);
            }
        }
    }
}

/// Saves `index` under `dir` with default retention.
pub fn save<P: AsRef<Path>>(index: &VectorIndex, dir: P) -> Result<u64> {
    IndexStore::new(dir).save(index)
}

/// Loads the live index under `dir`.
pub fn load<P: AsRef<Path>>(dir: P) -> Result<VectorIndex> {
    IndexStore::new(dir).load()
}

fn generation_name(generation: u64) -> String {
    format!("{}{:06}", GENERATION_PREFIX, generation)
}

fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix(GENERATION_PREFIX)?.parse().ok()
}

fn missing_is_corrupt(path: &Path, e: std::io::Error) -> RetrievalError {
    if e.kind() == std::io::ErrorKind::NotFound {
        RetrievalError::corrupt(path, "artifact missing from live generation")
    } else {
        RetrievalError::io(path, e)
    }
}

fn encode_vectors(index: &VectorIndex) -> Vec<u8> {
    let model = index.model_id().as_bytes();
    let data = index.raw_vectors();
    let mut bytes = Vec::with_capacity(40 + model.len() + data.len() * 4);
    bytes.extend_from_slice(VECTORS_MAGIC);
    bytes.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&index.created_at().to_le_bytes());
    bytes.extend_from_slice(&index.updated_at().to_le_bytes());
    bytes.extend_from_slice(&(model.len() as u32).to_le_bytes());
    bytes.extend_from_slice(model);
    bytes.extend(data.iter().flat_map(|f| f.to_le_bytes()));
    bytes
}

fn read_vectors(path: &Path) -> Result<VectorStore> {
    let bytes = fs::read(path).map_err(|e| missing_is_corrupt(path, e))?;
    decode_vectors(&bytes).map_err(|reason| RetrievalError::corrupt(path, reason))
}

fn decode_vectors(bytes: &[u8]) -> std::result::Result<VectorStore, String> {
    let mut reader = ByteReader::new(bytes);
    let truncated = || "truncated header".to_string();

    if reader.take(VECTORS_MAGIC.len()).ok_or_else(truncated)? != VECTORS_MAGIC {
        return Err("bad magic".to_string());
    }
    let dimension = reader.u32().ok_or_else(truncated)? as usize;
    let count = reader.u64().ok_or_else(truncated)?;
    let created_at = reader.i64().ok_or_else(truncated)?;
    let updated_at = reader.i64().ok_or_else(truncated)?;
    let model_len = reader.u32().ok_or_else(truncated)? as usize;
    let model_id = std::str::from_utf8(reader.take(model_len).ok_or_else(truncated)?)
        .map_err(|e| format!("model id is not UTF-8: {}", e))?
        .to_string();

    let count = usize::try_from(count).map_err(|_| format!("count {} overflows", count))?;
    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| format!("{} x {} vectors overflow", count, dimension))?;
    let data = reader.rest();
    if data.len() != expected {
        return Err(format!(
            "expected {} bytes for {} vectors of dimension {}, found {}",
            expected,
            count,
            dimension,
            data.len()
        ));
    }

    let vectors = data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(VectorStore {
        model_id,
        dimension,
        count,
        created_at,
        updated_at,
        vectors,
    })
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4)?.try_into().ok().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8)?.try_into().ok().map(u64::from_le_bytes)
    }

    fn i64(&mut self) -> Option<i64> {
        self.take(8)?.try_into().ok().map(i64::from_le_bytes)
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

/// Writes `bytes` to `path` through a synced temporary file and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = temporary_output_path(path);
    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(bytes)?;
            writer.flush()?;
        }
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        sync_parent_directory(path)
    })();

    result.map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        RetrievalError::io(path, e)
    })
}

fn temporary_output_path(path: &Path) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    let mut os = path.as_os_str().to_os_string();
    os.push(format!(".tmp.{pid}.{now}"));
    PathBuf::from(os)
}

fn sync_parent_directory(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
