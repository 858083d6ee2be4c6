//! Model executor contract
//!
//! The compiled model is opaque: token ids and an attention mask go in,
//! per-position scores over the vocabulary come out. Everything the engine
//! knows about the accelerator runtime is this trait.

use crate::{CoreError, Result};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use memmap2::Mmap;
use ndarray::{Array2, Array3};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// A compiled causal LM that can be run one forward pass at a time.
///
/// Implementations are not assumed reentrant; the engine serializes calls.
pub trait ModelExecutor: Send {
    /// Run one forward pass.
    ///
    /// `input_ids` and `attention_mask` are `[batch, positions]`; the result
    /// is `[batch, positions, vocab_size]` (a runtime may also return only the
    /// final position, `[batch, 1, vocab_size]`).
    fn run(&mut self, input_ids: &Array2<i64>, attention_mask: &Array2<i64>) -> Result<Array3<f32>>;

    /// Length of every score vector this executor produces
    fn vocab_size(&self) -> usize;

    /// Human-readable executor identity for logs and status
    fn name(&self) -> &str;
}

const TABLE_MAGIC: &[u8; 4] = b"KILN";
const TABLE_VERSION: u32 = 1;
const TABLE_HEADER_LEN: usize = 12;

/// `vocab_size * vocab_size`, or `None` if it does not fit in `usize`
fn table_entries(vocab_size: usize) -> Option<usize> {
    vocab_size.checked_mul(vocab_size)
}

enum TableStorage {
    Mapped(Mmap),
    Owned(Vec<f32>),
}

/// Reference executor backed by a precompiled bigram score table.
///
/// Row `t` of the table holds the next-token scores after token `t`, so the
/// score vector at each position depends only on the token at that position.
/// The artifact is a 12-byte header (`KILN`, version, vocab size as
/// little-endian u32) followed by `vocab * vocab` little-endian f32 values.
pub struct TableExecutor {
    name: String,
    vocab_size: usize,
    storage: TableStorage,
}

impl TableExecutor {
    /// Artifact location relative to a model directory
    pub const DEFAULT_ARTIFACT: &'static str = "compiled/scores.bin";

    /// Memory-map a score table artifact
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CoreError::io_with_path(e, path))?;
        // SAFETY: the artifact is treated as read-only for the executor's lifetime
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| CoreError::io_with_path(e, path))?;

        let (vocab_size, expected) = Self::parse_header(&mmap, path)?;
        if mmap.len() != expected {
            return Err(CoreError::configuration(
                "CONFIG_ARTIFACT_TRUNCATED",
                format!(
                    "Score table {} is {} bytes, expected {}",
                    path.display(),
                    mmap.len(),
                    expected
                ),
                "Loading compiled artifact",
                "Re-export the artifact; it is truncated or has trailing data",
            ));
        }

        let name = path
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "score-table".to_string());

        info!(path = %path.display(), vocab_size, "Mapped score table artifact");
        Ok(Self {
            name,
            vocab_size,
            storage: TableStorage::Mapped(mmap),
        })
    }

    /// Build from an in-memory table of `vocab_size * vocab_size` scores
    pub fn from_table(name: impl Into<String>, vocab_size: usize, table: Vec<f32>) -> Result<Self> {
        if vocab_size == 0 || table_entries(vocab_size) != Some(table.len()) {
            return Err(CoreError::configuration(
                "CONFIG_TABLE_SHAPE",
                format!(
                    "Score table has {} entries, expected {}x{}",
                    table.len(),
                    vocab_size,
                    vocab_size
                ),
                "Building in-memory score table",
                "Provide one row of vocab_size scores per token",
            ));
        }
        Ok(Self {
            name: name.into(),
            vocab_size,
            storage: TableStorage::Owned(table),
        })
    }

    /// Write a score table artifact in the format [`TableExecutor::open`] reads
    pub fn write_artifact<P: AsRef<Path>>(path: P, vocab_size: usize, table: &[f32]) -> Result<PathBuf> {
        let path = path.as_ref();
        let header_vocab = match u32::try_from(vocab_size) {
            Ok(v) if table_entries(vocab_size) == Some(table.len()) => v,
            _ => return Err(CoreError::configuration(
                "CONFIG_TABLE_SHAPE",
                format!(
                    "Score table has {} entries, expected {}x{}",
                    table.len(),
                    vocab_size,
                    vocab_size
                ),
                "Writing score table artifact",
                "Provide one row of vocab_size scores per token",
            )),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::io_with_path(e, parent))?;
        }

        let file = File::create(path).map_err(|e| CoreError::io_with_path(e, path))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(TABLE_MAGIC)?;
        writer.write_u32::<LittleEndian>(TABLE_VERSION)?;
        writer.write_u32::<LittleEndian>(header_vocab)?;
        for &score in table {
            writer.write_f32::<LittleEndian>(score)?;
        }
        writer.flush()?;
        Ok(path.to_path_buf())
    }

    /// Vocabulary size and the exact artifact length it implies
    fn parse_header(bytes: &[u8], path: &Path) -> Result<(usize, usize)> {
        let bad_header = |message: String| {
            CoreError::configuration(
                "CONFIG_ARTIFACT_HEADER",
                message,
                format!("Loading compiled artifact {}", path.display()),
                "Check that the file is a Kiln score table artifact",
            )
        };

        if bytes.len() < TABLE_HEADER_LEN || &bytes[..4] != TABLE_MAGIC {
            return Err(bad_header("Missing KILN magic".to_string()));
        }
        let version = LittleEndian::read_u32(&bytes[4..8]);
        if version != TABLE_VERSION {
            return Err(bad_header(format!("Unsupported artifact version {}", version)));
        }
        let vocab_size = LittleEndian::read_u32(&bytes[8..12]) as usize;
        if vocab_size == 0 {
            return Err(bad_header("Artifact declares an empty vocabulary".to_string()));
        }
        let expected = table_entries(vocab_size)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(TABLE_HEADER_LEN))
            .ok_or_else(|| {
                bad_header(format!(
                    "Vocabulary size {} is too large to address",
                    vocab_size
                ))
            })?;
        Ok((vocab_size, expected))
    }

    fn copy_row(&self, token: usize, out: &mut [f32]) {
        match &self.storage {
            TableStorage::Mapped(mmap) => {
                let start = TABLE_HEADER_LEN + token * self.vocab_size * 4;
                let end = start + self.vocab_size * 4;
                LittleEndian::read_f32_into(&mmap[start..end], out);
            }
            TableStorage::Owned(table) => {
                let start = token * self.vocab_size;
                out.copy_from_slice(&table[start..start + self.vocab_size]);
            }
        }
    }
}

impl ModelExecutor for TableExecutor {
    fn run(&mut self, input_ids: &Array2<i64>, attention_mask: &Array2<i64>) -> Result<Array3<f32>> {
        if input_ids.dim() != attention_mask.dim() {
            return Err(CoreError::execution(
                "EXECUTION_MASK_MISMATCH",
                format!(
                    "input_ids {:?} and attention_mask {:?} differ in shape",
                    input_ids.dim(),
                    attention_mask.dim()
                ),
                "Score table forward pass",
                "Build the attention mask from the same sequence as the ids",
            ));
        }

        let (batch, positions) = input_ids.dim();
        let vocab = self.vocab_size;
        let mut data = vec![0.0f32; batch * positions * vocab];

        for ((b, t), &id) in input_ids.indexed_iter() {
            if attention_mask[[b, t]] == 0 {
                continue;
            }
            let token = usize::try_from(id)
                .ok()
                .filter(|&token| token < vocab)
                .ok_or_else(|| {
                    CoreError::execution(
                        "EXECUTION_TOKEN_OUT_OF_RANGE",
                        format!("Token id {} is outside the vocabulary of {}", id, vocab),
                        "Score table forward pass",
                        "Check that the tokenizer matches the compiled artifact",
                    )
                })?;
            let offset = (b * positions + t) * vocab;
            self.copy_row(token, &mut data[offset..offset + vocab]);
        }

        Array3::from_shape_vec((batch, positions, vocab), data).map_err(|e| {
            CoreError::execution(
                "EXECUTION_OUTPUT_SHAPE",
                format!("Failed to assemble output tensor: {}", e),
                "Score table forward pass",
                "This is a bug in the score table executor",
            )
        })
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn identity_table(vocab: usize) -> Vec<f32> {
        (0..vocab * vocab)
            .map(|i| if i / vocab == i % vocab { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_owned_table_rows_follow_tokens() {
        let mut exec = TableExecutor::from_table("t", 3, identity_table(3)).unwrap();
        let ids = array![[2i64, 0]];
        let mask = Array2::<i64>::ones((1, 2));
        let out = exec.run(&ids, &mask).unwrap();
        assert_eq!(out.dim(), (1, 2, 3));
        assert_eq!(out[[0, 0, 2]], 1.0);
        assert_eq!(out[[0, 1, 0]], 1.0);
        assert_eq!(out[[0, 1, 2]], 0.0);
    }

    #[test]
    fn test_artifact_round_trip_through_mmap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny/compiled/scores.bin");
        let table: Vec<f32> = (0..16).map(|i| i as f32 * 0.5).collect();
        TableExecutor::write_artifact(&path, 4, &table).unwrap();

        let mut exec = TableExecutor::open(&path).unwrap();
        assert_eq!(exec.vocab_size(), 4);
        assert_eq!(exec.name(), "tiny");

        let out = exec.run(&array![[3i64]], &array![[1i64]]).unwrap();
        assert_eq!(out.as_slice().unwrap(), &table[12..16]);
    }

    #[test]
    fn test_truncated_artifact_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.bin");
        TableExecutor::write_artifact(&path, 2, &[0.0; 4]).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let err = TableExecutor::open(&path).err().unwrap();
        assert_eq!(err.code(), "CONFIG_ARTIFACT_TRUNCATED");
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.bin");
        std::fs::write(&path, b"NOPE\x01\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00").unwrap();
        let err = TableExecutor::open(&path).err().unwrap();
        assert_eq!(err.code(), "CONFIG_ARTIFACT_HEADER");
    }

    #[test]
    fn test_oversized_vocab_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.bin");
        let mut bytes = b"KILN\x01\x00\x00\x00".to_vec();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        std::fs::write(&path, &bytes).unwrap();

        let err = TableExecutor::open(&path).err().unwrap();
        assert_eq!(err.code(), "CONFIG_ARTIFACT_HEADER");
    }

    #[test]
    fn test_overflowing_table_shape_rejected() {
        let err = TableExecutor::from_table("t", usize::MAX, Vec::new()).err().unwrap();
        assert_eq!(err.code(), "CONFIG_TABLE_SHAPE");

        let dir = tempfile::tempdir().unwrap();
        let err = TableExecutor::write_artifact(dir.path().join("scores.bin"), usize::MAX, &[])
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_TABLE_SHAPE");
    }

    #[test]
    fn test_out_of_range_token_is_execution_error() {
        let mut exec = TableExecutor::from_table("t", 2, identity_table(2)).unwrap();
        let err = exec.run(&array![[5i64]], &array![[1i64]]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ExecutionError);
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let mut exec = TableExecutor::from_table("t", 2, identity_table(2)).unwrap();
        let err = exec.run(&array![[0i64, 1]], &array![[1i64]]).unwrap_err();
        assert_eq!(err.code(), "EXECUTION_MASK_MISMATCH");
    }
}
