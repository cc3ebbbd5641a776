// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers map text to dense vectors of a fixed dimension. They do not
//! normalize; unit-length scaling happens in the vector index so the provider
//! contract stays independent of the similarity metric.

use anyhow::{anyhow, bail, Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde_json::Value;
use std::borrow::Cow;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::config::{EmbeddingConfig, EmbeddingProviderType};

/// Embedding dimension of sentence-transformers/all-MiniLM-L6-v2.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 64;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 4000;
const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;

/// Configuration for the fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
}

impl EmbeddingProviderConfig {
    pub fn from_env() -> Result<Self> {
        let model = parse_model_env()?;
        let mut batch_size = parse_usize_env("FASTEMBED_BATCH_SIZE", DEFAULT_FASTEMBED_BATCH_SIZE)?;
        if batch_size == 0 {
            batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
        }
        if batch_size > MAX_FASTEMBED_BATCH_SIZE {
            tracing::warn!(
                "FASTEMBED_BATCH_SIZE={} exceeds max {}; clamping.",
                batch_size,
                MAX_FASTEMBED_BATCH_SIZE
            );
            batch_size = MAX_FASTEMBED_BATCH_SIZE;
        }

        let mut max_chars = parse_usize_env("FASTEMBED_MAX_CHARS", DEFAULT_FASTEMBED_MAX_CHARS)?;
        if max_chars == 0 {
            max_chars = DEFAULT_FASTEMBED_MAX_CHARS;
        }

        Ok(Self {
            model,
            batch_size,
            max_chars,
        })
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
        }
    }
}

/// Trait for embedding providers.
///
/// `embed_texts` returns one vector per input, in input order, each of
/// length `dimension()`. Encoding a batch must give the same vectors as
/// encoding its texts one at a time.
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier recorded in the index.
    fn model_id(&self) -> &str;

    /// Returns the dimensionality of produced vectors.
    fn dimension(&self) -> usize;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates embeddings for the given texts.
    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        result.pop().ok_or_else(|| anyhow!("No embedding returned"))
    }
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<P> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn batch_size(&self) -> usize {
        (**self).batch_size()
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_texts(texts)
    }
}

/// Checks a provider response against the request.
pub fn validate_batch(expected_count: usize, dimension: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected_count {
        bail!(
            "Provider returned {} embeddings for {} texts",
            vectors.len(),
            expected_count
        );
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
        bail!(
            "Embedding {} has dimension {}, expected {}",
            i,
            v.len(),
            dimension
        );
    }
    Ok(())
}

/// Builds the provider selected in the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider() {
        EmbeddingProviderType::Builtin => {
            let mut provider_config = EmbeddingProviderConfig::from_env()?;
            if let Some(batch_size) = config.batch_size {
                provider_config.batch_size = batch_size.clamp(1, MAX_FASTEMBED_BATCH_SIZE);
            }
            Box::new(FastEmbedder::new(provider_config)?)
        }
        EmbeddingProviderType::Command => Box::new(
            CommandProvider::new(
                config.command().to_string(),
                config.model().to_string(),
                config.dimension(),
            )
            .with_batch_size(config.batch_size()),
        ),
        EmbeddingProviderType::Hash => {
            Box::new(HashEmbedder::new(config.dimension()).with_batch_size(config.batch_size()))
        }
    };
    tracing::debug!(
        model = provider.model_id(),
        dimension = provider.dimension(),
        "embedding provider ready"
    );
    Ok(provider)
}

/// FastEmbed provider using sentence-transformers/all-MiniLM-L6-v2.
pub struct FastEmbedder {
    embedder: TextEmbedding,
    config: EmbeddingProviderConfig,
    model_id: String,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> Result<Self> {
        let model = config.model.clone();
        let model_id = model.to_string();
        let init = InitOptions::new(model);
        let embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

        Ok(Self {
            embedder,
            config,
            model_id,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(EmbeddingProviderConfig::from_env()?)
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        DEFAULT_EMBEDDING_DIM
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.config.max_chars);
        let embeddings = self
            .embedder
            .embed(&prepared, Some(self.config.batch_size))?;

        Ok(embeddings)
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": .., "texts": [..]}` on stdin and prints a
/// JSON array of vectors (or an object holding one under `embeddings`,
/// `vectors` or `data`).
pub struct CommandProvider {
    command: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String, dimension: usize) -> Self {
        Self {
            command,
            model,
            dimension,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload_str = payload.to_string();
            stdin
                .write_all(payload_str.as_bytes())
                .context("Failed to write embeddings payload to stdin")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to read embeddings command output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Embedding command failed (status {}): {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_command_output(stdout.trim())
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.run_command(texts)?;
        validate_batch(texts.len(), self.dimension, &vectors)?;
        Ok(vectors)
    }
}

fn parse_command_output(stdout: &str) -> Result<Vec<Vec<f32>>> {
    let parsed: Value = serde_json::from_str(stdout)
        .with_context(|| "Failed to parse embeddings command output as JSON")?;

    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(ref obj) => {
            if let Some(value) = obj.get("embeddings") {
                value.clone()
            } else if let Some(value) = obj.get("vectors") {
                value.clone()
            } else if let Some(value) = obj.get("data") {
                value.clone()
            } else {
                bail!("Embeddings command output missing 'embeddings' field");
            }
        }
        _ => bail!("Embeddings command output must be JSON array or object"),
    };

    embeddings_value
        .as_array()
        .ok_or_else(|| anyhow!("Embeddings output must be a JSON array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow!("Embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .ok_or_else(|| anyhow!("Embedding value must be a number"))
                        .map(|v| v as f32)
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect::<Result<Vec<Vec<f32>>>>()
}

/// Model-free provider that hashes lower-cased words into signed buckets.
///
/// Deterministic across runs and machines; texts sharing words get
/// overlapping vectors, which is enough for offline use and tests.
pub struct HashEmbedder {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HashEmbedder {
    /// Creates a new hashing provider with specified dimension.
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model: format!("blake3-hash-{}", dimension),
            dimension,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = blake3::hash(word.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket = [0_u8; 8];
            bucket.copy_from_slice(&bytes[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        vector
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

fn truncate_texts<'a>(texts: &'a [String], max_chars: usize) -> Vec<Cow<'a, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars<'a>(input: &'a str, max_chars: usize) -> Cow<'a, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

fn parse_model_env() -> Result<EmbeddingModel> {
    let raw = env::var("FASTEMBED_MODEL").unwrap_or_else(|_| DEFAULT_FASTEMBED_MODEL.to_string());
    let value = raw.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => bail!(
            "Unsupported FASTEMBED_MODEL '{}'. Supported value: {}",
            other,
            DEFAULT_FASTEMBED_MODEL
        ),
    }
}

fn parse_usize_env(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .with_context(|| format!("Invalid {} value: {}", name, value))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hash_provider_shape() {
        let mut provider = HashEmbedder::new(64);
        assert_eq!(provider.model_id(), "blake3-hash-64");
        assert_eq!(provider.dimension(), 64);

        let result = provider
            .embed_texts(&texts(&["opening balance", "closing balance"]))
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].len(), 64);
        validate_batch(2, 64, &result).unwrap();
    }

    #[test]
    fn test_hash_provider_is_deterministic() {
        let mut a = HashEmbedder::new(128);
        let mut b = HashEmbedder::new(128);
        let text = "Direct debit to British Gas 54.20";
        assert_eq!(a.embed_one(text).unwrap(), b.embed_one(text).unwrap());
    }

    #[test]
    fn test_batch_matches_single() {
        let mut provider = HashEmbedder::new(32);
        let inputs = texts(&["salary credit", "atm withdrawal", "", "interest paid"]);
        let batch = provider.embed_texts(&inputs).unwrap();
        for (text, vector) in inputs.iter().zip(&batch) {
            assert_eq!(&provider.embed_one(text).unwrap(), vector);
        }
    }

    #[test]
    fn test_hash_provider_ignores_case_and_punctuation() {
        let mut provider = HashEmbedder::new(32);
        assert_eq!(
            provider.embed_one("Account Number: 1234").unwrap(),
            provider.embed_one("account number 1234").unwrap()
        );
    }

    #[test]
    fn test_empty_embed() {
        let mut provider = HashEmbedder::new(16);
        assert!(provider.embed_texts(&[]).unwrap().is_empty());
        assert!(provider.embed_one("").unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_validate_batch_rejects_bad_shapes() {
        assert!(validate_batch(2, 3, &[vec![0.0; 3]]).is_err());
        assert!(validate_batch(1, 3, &[vec![0.0; 4]]).is_err());
        assert!(validate_batch(0, 3, &[]).is_ok());
    }

    #[test]
    fn test_parse_command_output_shapes() {
        let plain = parse_command_output("[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        assert_eq!(plain, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

        let wrapped = parse_command_output(r#"{"embeddings": [[0.5]]}"#).unwrap();
        assert_eq!(wrapped, vec![vec![0.5]]);

        assert!(parse_command_output(r#"{"other": 1}"#).is_err());
        assert!(parse_command_output("[[\"x\"]]").is_err());
    }

    #[test]
    fn test_boxed_provider_delegates() {
        let mut boxed: Box<dyn EmbeddingProvider> = Box::new(HashEmbedder::new(8));
        assert_eq!(boxed.dimension(), 8);
        assert_eq!(boxed.embed_one("x").unwrap().len(), 8);
    }

    #[test]
    fn test_truncate_to_chars() {
        let input = "héllo";
        assert_eq!(
            truncate_to_chars(input, 2),
            Cow::<str>::Owned("hé".to_string())
        );
        assert_eq!(truncate_to_chars(input, 5), Cow::Borrowed(input));
    }
}
