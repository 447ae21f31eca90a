//! In-memory flat vector index with squared Euclidean search.
//!
//! Rows are kept in insertion order; row `i` is the embedding of record `i`
//! of the paired store.

/// Top-k similarity query over a sealed index.
///
/// `search` returns up to `k` slots, best match first. A `None` slot is the
/// "no match" sentinel an adapter may return for an unfilled slot; callers
/// skip it.
pub trait NearestNeighbors: Send + Sync {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Option<usize>>, IndexError>;

    /// Number of rows in the index.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact (brute force) L2 index.
pub struct VectorIndex {
    rows: Vec<Vec<f32>>,
    dimensions: usize,
}

impl VectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            rows: Vec::new(),
            dimensions,
        }
    }

    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Append a row; its row index is the previous `len()`.
    pub fn push(&mut self, embedding: Vec<f32>) -> Result<usize, IndexError> {
        self.check_dimensions(&embedding)?;
        self.rows.push(embedding);
        Ok(self.rows.len() - 1)
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.rows.iter().map(Vec::as_slice)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        Ok(())
    }

    fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
    }
}

impl NearestNeighbors for VectorIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Option<usize>>, IndexError> {
        self.check_dimensions(query)?;

        if k == 0 {
            return Ok(vec![]);
        }

        let mut scored: Vec<(usize, f32)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(row, embedding)| (row, Self::squared_l2(query, embedding)))
            .collect();

        // Closest first; equal distances keep row order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        // Never more slots than rows, whatever k the caller asked for
        Ok(scored
            .into_iter()
            .take(k.min(self.rows.len()))
            .map(|(row, _)| Some(row))
            .collect())
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
