//! Tokenizer adapter
//!
//! The engine only needs three things from a tokenizer: turn the prompt into
//! ids, turn generated ids back into text, and name the end-of-sequence id.

pub mod bpe;
pub mod vocab;

use crate::Result;
use std::path::{Path, PathBuf};

/// Main tokenizer trait that all tokenizer implementations must implement
pub trait Tokenizer: Send + Sync {
    /// Encode text into a sequence of token IDs, without special tokens
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token IDs back into text, skipping special tokens
    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Number of token ids the tokenizer knows about
    fn vocab_size(&self) -> usize;

    /// Get the end of sequence token ID
    fn eos_token_id(&self) -> Option<u32>;

    /// Check if a token ID is a special token
    fn is_special_token(&self, id: u32) -> bool;
}

/// Configuration for tokenizer initialization
#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    /// Path to the `token -> id` JSON vocabulary
    pub vocab_path: PathBuf,

    /// Path to the ranked merge rules
    pub merges_path: PathBuf,

    /// End of sequence token
    pub eos_token: Option<String>,

    /// Unknown token
    pub unk_token: Option<String>,

    /// Extra tokens that are stripped when decoding
    pub additional_special_tokens: Vec<String>,
}

impl TokenizerConfig {
    /// Standard file layout inside a model directory
    pub fn for_model_dir(dir: &Path) -> Self {
        Self {
            vocab_path: dir.join("vocab.json"),
            merges_path: dir.join("merges.txt"),
            ..Default::default()
        }
    }

    pub fn with_eos_token(mut self, token: Option<String>) -> Self {
        self.eos_token = token;
        self
    }

    pub fn with_unk_token(mut self, token: Option<String>) -> Self {
        self.unk_token = token;
        self
    }
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            vocab_path: PathBuf::from("vocab.json"),
            merges_path: PathBuf::from("merges.txt"),
            eos_token: Some("<|endoftext|>".to_string()),
            unk_token: None,
            additional_special_tokens: Vec::new(),
        }
    }
}
