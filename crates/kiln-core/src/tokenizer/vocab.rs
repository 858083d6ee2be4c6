//! Vocabulary management for tokenizers

use crate::{CoreError, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Vocabulary container for managing token-to-id and id-to-token mappings
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    /// Token to ID mapping
    token_to_id: HashMap<String, u32>,

    /// ID to token mapping
    id_to_token: HashMap<u32, String>,

    /// Special token IDs
    special_ids: HashSet<u32>,

    /// Unknown token ID
    unk_token_id: Option<u32>,

    /// End of sequence token ID
    eos_token_id: Option<u32>,
}

impl Vocabulary {
    /// Create a new empty vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Load vocabulary from a JSON `{"token": id}` file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CoreError::tokenizer(
                "TOKENIZER_VOCAB_FILE_OPEN_ERROR",
                format!("Failed to read vocabulary file {}: {}", path.display(), e),
                "Vocabulary file loading",
                "Check that vocab.json exists in the model directory",
            )
        })?;
        Self::from_json(&json)
    }

    /// Load vocabulary from JSON format
    pub fn from_json(json_str: &str) -> Result<Self> {
        let token_map: HashMap<String, u32> = serde_json::from_str(json_str).map_err(|e| {
            CoreError::tokenizer(
                "TOKENIZER_VOCAB_JSON_PARSE_ERROR",
                format!("Failed to parse JSON vocabulary: {}", e),
                "JSON vocabulary file parsing",
                "Check JSON format and syntax",
            )
        })?;

        let mut vocab = Self::new();
        for (token, id) in token_map {
            vocab.add_token(token, id);
        }
        Ok(vocab)
    }

    /// Add a token to the vocabulary
    pub fn add_token(&mut self, token: String, id: u32) {
        self.token_to_id.insert(token.clone(), id);
        self.id_to_token.insert(id, token);
    }

    /// Mark an existing token as special; returns its id
    pub fn mark_special(&mut self, token: &str) -> Result<u32> {
        let id = self.token_to_id(token).ok_or_else(|| {
            CoreError::tokenizer(
                "TOKENIZER_SPECIAL_TOKEN_MISSING",
                format!("Special token {:?} is not in the vocabulary", token),
                "Special token registration",
                "Check model.eos_token / model.unk_token against vocab.json",
            )
        })?;
        self.special_ids.insert(id);
        Ok(id)
    }

    pub fn set_eos_token(&mut self, token: &str) -> Result<()> {
        self.eos_token_id = Some(self.mark_special(token)?);
        Ok(())
    }

    pub fn set_unk_token(&mut self, token: &str) -> Result<()> {
        self.unk_token_id = Some(self.mark_special(token)?);
        Ok(())
    }

    /// Get token ID
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Get token by ID
    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(|s| s.as_str())
    }

    /// One past the largest id, i.e. the length a score vector must have
    pub fn size(&self) -> usize {
        self.id_to_token
            .keys()
            .max()
            .map_or(0, |&max| max as usize + 1)
    }

    /// Check if an ID corresponds to a special token
    pub fn is_special_id(&self, id: u32) -> bool {
        self.special_ids.contains(&id)
    }

    /// Get unknown token ID
    pub fn unk_token_id(&self) -> Option<u32> {
        self.unk_token_id
    }

    /// Get end of sequence token ID
    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }
}
