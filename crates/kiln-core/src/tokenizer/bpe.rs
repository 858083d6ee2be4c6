//! Byte-level Byte Pair Encoding (BPE) tokenizer
//!
//! Reads the `vocab.json` + `merges.txt` pair that sits next to every exported
//! causal LM. Merges are applied lowest rank first.

use crate::tokenizer::{Tokenizer, TokenizerConfig};
use crate::{CoreError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::vocab::Vocabulary;

const PRETOKENIZE_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+";

/// BPE tokenizer implementation
pub struct BPETokenizer {
    /// Vocabulary
    vocab: Vocabulary,

    /// Merge rules, pair -> rank (lower merges first)
    merges: HashMap<(String, String), usize>,

    /// Byte to unicode mapping for encoding
    byte_encoder: HashMap<u8, char>,

    /// Unicode to byte mapping for decoding
    byte_decoder: HashMap<char, u8>,

    /// Pattern for pre-tokenization
    pattern: Regex,
}

impl BPETokenizer {
    /// Load a tokenizer from the files named in `config`
    pub fn from_files(config: &TokenizerConfig) -> Result<Self> {
        let vocab = Vocabulary::from_json_file(&config.vocab_path)?;
        let merges_text = std::fs::read_to_string(&config.merges_path).map_err(|e| {
            CoreError::tokenizer(
                "TOKENIZER_MERGES_FILE_OPEN_ERROR",
                format!(
                    "Failed to read merges file {}: {}",
                    config.merges_path.display(),
                    e
                ),
                "Merges file loading",
                "Check that merges.txt exists in the model directory",
            )
        })?;
        let merges = parse_merges(&merges_text);
        let tokenizer = Self::from_parts(vocab, merges, config)?;

        debug!(
            vocab = tokenizer.vocab.size(),
            merges = tokenizer.merges.len(),
            eos = ?tokenizer.vocab.eos_token_id(),
            "Loaded BPE tokenizer"
        );
        Ok(tokenizer)
    }

    /// Load from the standard layout inside a model directory
    pub fn from_model_dir(dir: &Path, config: &TokenizerConfig) -> Result<Self> {
        let mut config = config.clone();
        config.vocab_path = dir.join("vocab.json");
        config.merges_path = dir.join("merges.txt");
        Self::from_files(&config)
    }

    /// Build from an in-memory vocabulary and ordered merge list
    pub fn from_parts(
        mut vocab: Vocabulary,
        merges: Vec<(String, String)>,
        config: &TokenizerConfig,
    ) -> Result<Self> {
        if let Some(eos) = &config.eos_token {
            vocab.set_eos_token(eos)?;
        }
        if let Some(unk) = &config.unk_token {
            vocab.set_unk_token(unk)?;
        }
        for token in &config.additional_special_tokens {
            vocab.mark_special(token)?;
        }

        let pattern = Regex::new(PRETOKENIZE_PATTERN).map_err(|e| {
            CoreError::tokenizer(
                "TOKENIZER_PATTERN_ERROR",
                format!("Failed to compile pre-tokenization pattern: {}", e),
                "BPE tokenizer construction",
                "This is a bug in the tokenizer",
            )
        })?;
        let (byte_encoder, byte_decoder) = Self::create_byte_mappings();
        let merges = merges
            .into_iter()
            .enumerate()
            .map(|(rank, pair)| (pair, rank))
            .collect();

        Ok(Self {
            vocab,
            merges,
            byte_encoder,
            byte_decoder,
            pattern,
        })
    }

    /// Create byte to unicode mappings
    fn create_byte_mappings() -> (HashMap<u8, char>, HashMap<char, u8>) {
        let mut byte_encoder = HashMap::new();
        let mut byte_decoder = HashMap::new();

        // Printable bytes map to themselves, the rest to 256 + n
        let mut n = 0u32;
        for b in 0u8..=255 {
            let printable = (33..=126).contains(&b) || (161..=172).contains(&b) || b >= 174;
            let c = if printable {
                Some(char::from(b))
            } else {
                n += 1;
                char::from_u32(256 + n - 1)
            };
            if let Some(c) = c {
                byte_encoder.insert(b, c);
                byte_decoder.insert(c, b);
            }
        }

        (byte_encoder, byte_decoder)
    }

    /// Apply BPE merges to one pre-token
    fn bpe(&self, token: &str) -> Vec<String> {
        let mut word: Vec<String> = token.chars().map(|c| c.to_string()).collect();

        while word.len() > 1 {
            let best = word
                .windows(2)
                .filter_map(|pair| {
                    self.merges
                        .get(&(pair[0].clone(), pair[1].clone()))
                        .map(|&rank| (rank, pair[0].clone(), pair[1].clone()))
                })
                .min_by_key(|(rank, _, _)| *rank);

            let Some((_, left, right)) = best else {
                break;
            };

            let mut merged = Vec::with_capacity(word.len());
            let mut i = 0;
            while i < word.len() {
                if i + 1 < word.len() && word[i] == left && word[i + 1] == right {
                    merged.push(format!("{}{}", left, right));
                    i += 2;
                } else {
                    merged.push(word[i].clone());
                    i += 1;
                }
            }
            word = merged;
        }

        word
    }

    /// Encode text to bytes then to unicode characters
    fn text_to_unicode(&self, text: &str) -> String {
        text.bytes()
            .filter_map(|b| self.byte_encoder.get(&b).copied())
            .collect()
    }

    /// Decode unicode characters back to bytes then to text.
    ///
    /// Generated suffixes can end inside a multi-byte character, so invalid
    /// UTF-8 is replaced rather than rejected.
    fn unicode_to_text(&self, unicode: &str) -> String {
        let mut bytes = Vec::with_capacity(unicode.len());
        for c in unicode.chars() {
            match self.byte_decoder.get(&c) {
                Some(&b) => bytes.push(b),
                None => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Tokenizer for BPETokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut token_ids = Vec::new();

        for mat in self.pattern.find_iter(text) {
            let unicode_token = self.text_to_unicode(mat.as_str());

            for piece in self.bpe(&unicode_token) {
                match self.vocab.token_to_id(&piece).or(self.vocab.unk_token_id()) {
                    Some(id) => token_ids.push(id),
                    None => {
                        return Err(CoreError::tokenizer(
                            "TOKENIZER_UNKNOWN_PIECE",
                            format!("No vocabulary entry for piece {:?}", piece),
                            format!("Encoding {:?}", mat.as_str()),
                            "Configure model.unk_token or use a complete byte-level vocabulary",
                        ));
                    }
                }
            }
        }

        Ok(token_ids)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        let text: String = tokens
            .iter()
            .filter(|&&id| !self.vocab.is_special_id(id))
            .filter_map(|&id| self.vocab.id_to_token(id))
            .collect();

        Ok(self.unicode_to_text(&text))
    }

    fn vocab_size(&self) -> usize {
        self.vocab.size()
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.vocab.eos_token_id()
    }

    fn is_special_token(&self, id: u32) -> bool {
        self.vocab.is_special_id(id)
    }
}

/// Parse `merges.txt`: one `left right` pair per line, `#` lines are headers
pub fn parse_merges(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(left), Some(right), None) => Some((left.to_string(), right.to_string())),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_tokenizer() -> BPETokenizer {
        let vocab = Vocabulary::from_json(
            r#"{"a": 0, "b": 1, "Ġ": 2, "ab": 3, "Ġa": 4, "<|endoftext|>": 5, "!": 6}"#,
        )
        .unwrap();
        let merges = parse_merges("#version: 0.2\na b\n\u{120} a\n");
        BPETokenizer::from_parts(vocab, merges, &TokenizerConfig::default()).unwrap()
    }

    #[test]
    fn test_byte_mappings() {
        let (encoder, decoder) = BPETokenizer::create_byte_mappings();
        assert_eq!(encoder.len(), 256);
        for b in 0u8..=255 {
            let c = encoder[&b];
            assert_eq!(decoder[&c], b);
        }
        assert_eq!(encoder[&b' '], '\u{120}');
    }

    #[test]
    fn test_merges_apply_by_rank() {
        let tokenizer = tiny_tokenizer();
        // " ab" could merge as (Ġ a) or (a b); "a b" has the lower rank
        assert_eq!(tokenizer.encode("ab ab").unwrap(), vec![3, 2, 3]);
        assert_eq!(tokenizer.encode(" a").unwrap(), vec![4]);
    }

    #[test]
    fn test_decode_skips_special_tokens() {
        let tokenizer = tiny_tokenizer();
        assert_eq!(tokenizer.decode(&[3, 2, 3, 5]).unwrap(), "ab ab");
        assert_eq!(tokenizer.eos_token_id(), Some(5));
        assert!(tokenizer.is_special_token(5));
    }

    #[test]
    fn test_unknown_piece_fails_without_unk() {
        let tokenizer = tiny_tokenizer();
        let err = tokenizer.encode("zzz").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::TokenizationError);
    }

    #[test]
    fn test_missing_eos_token_rejected() {
        let vocab = Vocabulary::from_json(r#"{"a": 0}"#).unwrap();
        assert!(BPETokenizer::from_parts(vocab, Vec::new(), &TokenizerConfig::default()).is_err());
    }

    #[test]
    fn test_load_from_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vocab.json"), r#"{"h": 0, "i": 1, "hi": 2, "<|endoftext|>": 3}"#).unwrap();
        std::fs::write(dir.path().join("merges.txt"), "#version: 0.2\nh i\n").unwrap();

        let tokenizer = BPETokenizer::from_model_dir(dir.path(), &TokenizerConfig::default()).unwrap();
        assert_eq!(tokenizer.encode("hi").unwrap(), vec![2]);
        assert_eq!(tokenizer.vocab_size(), 4);
    }

    #[test]
    fn test_parse_merges_skips_malformed_lines() {
        let merges = parse_merges("#version: 0.2\na b\nbad\nc d e\n");
        assert_eq!(merges, vec![("a".to_string(), "b".to_string())]);
    }
}
