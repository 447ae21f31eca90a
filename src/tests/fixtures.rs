//! Deterministic stand-ins for the query encoder and the vector index.

use std::sync::Mutex;

use crate::records::{FieldKey, Record};
use crate::semantic::embeddings::{EmbeddingError, QueryEncoder};
use crate::semantic::{IndexError, NearestNeighbors};

pub const DIMENSIONS: usize = 3;

pub fn record(id: &str, title: &str, content: &str, incident_number: Option<&str>) -> Record {
    let mut record = Record {
        id: id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        ..Default::default()
    };
    if let Some(number) = incident_number {
        record.fields.insert(FieldKey::IncidentNumber, number);
    }
    record
}

/// Always embeds to the zero vector.
pub struct StaticEncoder;

impl QueryEncoder for StaticEncoder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![0.0; DIMENSIONS])
    }
}

pub struct FailingEncoder;

impl QueryEncoder for FailingEncoder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::EmbeddingFailed("model offline".to_string()))
    }
}

/// Remembers every text it was asked to embed.
#[derive(Default)]
pub struct RecordingEncoder {
    seen: Mutex<Vec<String>>,
}

impl RecordingEncoder {
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl QueryEncoder for RecordingEncoder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.seen.lock().unwrap().push(text.to_string());
        Ok(vec![0.0; DIMENSIONS])
    }
}

/// Index returning a fixed list of slots regardless of the query vector.
pub struct ScriptedIndex {
    slots: Option<Vec<Option<usize>>>,
}

impl ScriptedIndex {
    pub fn rows(rows: &[usize]) -> Self {
        Self::slots(rows.iter().copied().map(Some).collect())
    }

    pub fn slots(slots: Vec<Option<usize>>) -> Self {
        Self { slots: Some(slots) }
    }

    /// Every search fails like a corrupt index would.
    pub fn failing() -> Self {
        Self { slots: None }
    }
}

impl NearestNeighbors for ScriptedIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Option<usize>>, IndexError> {
        match &self.slots {
            Some(slots) => Ok(slots.iter().copied().take(k).collect()),
            None => Err(IndexError::DimensionMismatch {
                expected: DIMENSIONS + 1,
                got: query.len(),
            }),
        }
    }

    fn len(&self) -> usize {
        self.slots
            .as_ref()
            .map(|slots| slots.iter().flatten().count())
            .unwrap_or(0)
    }
}
