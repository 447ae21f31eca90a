//! Binary storage for a category's vector index.
//!
//! File format: `<category>.vectors.bin`
//!
//! Header (79 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - row_count: u64 (little-endian)
//! - store_fingerprint: [u8; 32] (SHA256 over the paired record ids, in order)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Rows (repeated row_count times, in store order):
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::records::RecordStore;
use crate::semantic::index::{IndexError, NearestNeighbors, VectorIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// version(1) + model_id(32) + dimensions(2) + row_count(8) + fingerprint(32) + checksum(4)
const HEADER_SIZE: usize = 79;
const CHECKSUM_OFFSET: usize = HEADER_SIZE - 4;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Store mismatch: vectors were built from a different record sequence")]
    StoreMismatch,
}

impl From<IndexError> for VectorStorageError {
    fn from(err: IndexError) -> Self {
        VectorStorageError::InvalidFormat(err.to_string())
    }
}

/// Fingerprint of a record sequence: any insert, removal or reorder changes it.
pub fn store_fingerprint(store: &RecordStore) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for record in store.iter() {
        hasher.update(record.id.as_bytes());
        hasher.update([0u8]);
    }
    hasher.finalize().into()
}

/// Storage manager for one vectors file.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the index, refusing files built by another model or from another
    /// record sequence than `expected_fingerprint`.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
        expected_fingerprint: &[u8; 32],
    ) -> Result<VectorIndex, VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = self.read_header(&mut reader)?;
        self.validate_header(&header, expected_model_id, expected_dimensions)?;

        if header.store_fingerprint != *expected_fingerprint {
            return Err(VectorStorageError::StoreMismatch);
        }

        let dimensions = header.dimensions as usize;
        let mut index = VectorIndex::with_capacity(dimensions, header.row_count as usize);

        for _ in 0..header.row_count {
            let row = self.read_row(&mut reader, dimensions)?;
            index.push(row)?;
        }

        Ok(index)
    }

    /// Save the index. Uses atomic write: temp file -> fsync -> rename
    pub fn save(
        &self,
        index: &VectorIndex,
        model_id: &[u8; 32],
        store_fingerprint: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, index, model_id, store_fingerprint);

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn write_to_file(
        &self,
        path: &Path,
        index: &VectorIndex,
        model_id: &[u8; 32],
        store_fingerprint: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
            VectorStorageError::InvalidFormat(format!(
                "{} dimensions do not fit the header",
                index.dimensions()
            ))
        })?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimensions,
            row_count: index.len() as u64,
            store_fingerprint: *store_fingerprint,
        };
        self.write_header(&mut writer, &header)?;

        for row in index.rows() {
            for &value in row {
                writer.write_all(&value.to_le_bytes())?;
            }
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(&self, reader: &mut impl Read) -> Result<Header, VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                VectorStorageError::InvalidFormat("file shorter than header".to_string())
            } else {
                e.into()
            }
        })?;

        let version = header_bytes[0];
        if version > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored_checksum = u32::from_le_bytes(le_array(&header_bytes[CHECKSUM_OFFSET..]));
        let computed_checksum = crc32fast::hash(&header_bytes[..CHECKSUM_OFFSET]);
        if stored_checksum != computed_checksum {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        Ok(Header {
            version,
            model_id: le_array(&header_bytes[1..33]),
            dimensions: u16::from_le_bytes(le_array(&header_bytes[33..35])),
            row_count: u64::from_le_bytes(le_array(&header_bytes[35..43])),
            store_fingerprint: le_array(&header_bytes[43..75]),
        })
    }

    fn validate_header(
        &self,
        header: &Header,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<(), VectorStorageError> {
        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }

        if header.dimensions as usize != expected_dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        Ok(())
    }

    fn write_header(
        &self,
        writer: &mut impl Write,
        header: &Header,
    ) -> Result<(), VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = header.version;
        header_bytes[1..33].copy_from_slice(&header.model_id);
        header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[35..43].copy_from_slice(&header.row_count.to_le_bytes());
        header_bytes[43..75].copy_from_slice(&header.store_fingerprint);

        let checksum = crc32fast::hash(&header_bytes[..CHECKSUM_OFFSET]);
        header_bytes[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_row(
        &self,
        reader: &mut impl Read,
        dimensions: usize,
    ) -> Result<Vec<f32>, VectorStorageError> {
        let mut row = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            let mut float_bytes = [0u8; 4];
            reader.read_exact(&mut float_bytes).map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    VectorStorageError::InvalidFormat("truncated row data".to_string())
                } else {
                    e.into()
                }
            })?;
            row.push(f32::from_le_bytes(float_bytes));
        }
        Ok(row)
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    row_count: u64,
    store_fingerprint: [u8; 32],
}
