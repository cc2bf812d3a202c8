//! Error and warning types shared by every analysis stage
//!
//! Fatal conditions are [`HeapError`] values; recoverable per-object or
//! per-segment conditions are collected as [`AnalysisWarning`]s and returned
//! alongside the otherwise complete result.

use crate::model::Identifier;
use serde::Serialize;
use thiserror::Error;

/// Errors that abort (part of) a snapshot analysis
#[derive(Error, Debug)]
pub enum HeapError {
    #[error("truncated input at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedInput {
        offset: u64,
        needed: usize,
        available: usize,
    },

    #[error("unsupported record tag {tag:#04x} at offset {offset}")]
    UnsupportedRecordTag { tag: u8, offset: u64 },

    #[error("malformed record {tag:#04x} at offset {offset}: {reason}")]
    MalformedRecord { tag: u8, offset: u64, reason: String },

    #[error("malformed heap-dump sub-record {tag:#04x} at offset {offset}: {reason}")]
    MalformedSubRecord { tag: u8, offset: u64, reason: String },

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{stage} exceeded resource limit: {actual} > {limit}")]
    ResourceLimitExceeded {
        stage: &'static str,
        limit: usize,
        actual: usize,
    },

    #[error("analysis cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record {tag:#04x} at offset {offset}: {source}")]
    InRecord {
        tag: u8,
        offset: u64,
        #[source]
        source: Box<HeapError>,
    },
}

impl HeapError {
    /// Attach the enclosing top-level record to a decode error
    pub(crate) fn in_record(self, tag: u8, offset: u64) -> Self {
        match self {
            // Already carries its position
            HeapError::InRecord { .. } | HeapError::Cancelled => self,
            other => HeapError::InRecord {
                tag,
                offset,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with record context stripped
    pub fn root_cause(&self) -> &HeapError {
        let mut current = self;
        while let HeapError::InRecord { source, .. } = current {
            current = source;
        }
        current
    }

    /// Top-level record tag and offset where a decode error occurred
    pub fn record_position(&self) -> Option<(u8, u64)> {
        match self {
            HeapError::InRecord { tag, offset, .. } => Some((*tag, *offset)),
            HeapError::UnsupportedRecordTag { tag, offset }
            | HeapError::MalformedRecord { tag, offset, .. } => Some((*tag, *offset)),
            _ => None,
        }
    }

    /// Whether this error abandons only the enclosing heap-dump segment
    pub fn is_segment_local(&self) -> bool {
        matches!(self.root_cause(), HeapError::MalformedSubRecord { .. })
    }
}

/// Result type for heap analysis operations
pub type Result<T> = std::result::Result<T, HeapError>;

/// Recoverable condition noticed during analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisWarning {
    /// An instance's class layout is wider than its stored field bytes
    InconsistentFieldLayout {
        object_id: Identifier,
        class_id: Identifier,
        layout_size: usize,
        data_size: usize,
    },

    /// An instance references a class that has no class dump
    UnknownClass {
        object_id: Identifier,
        class_id: Identifier,
    },

    /// A heap-dump segment was abandoned at a malformed sub-record
    SegmentAbandoned {
        segment_offset: u64,
        skipped_bytes: usize,
        error: String,
    },

    /// The approximate dominator pass stopped before converging
    DominatorIterationCap { iterations: usize, changed: usize },
}

impl std::fmt::Display for AnalysisWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisWarning::InconsistentFieldLayout {
                object_id,
                class_id,
                layout_size,
                data_size,
            } => write!(
                f,
                "instance {} of class {}: layout needs {} bytes but only {} stored",
                object_id, class_id, layout_size, data_size
            ),
            AnalysisWarning::UnknownClass {
                object_id,
                class_id,
            } => write!(f, "instance {} has no class dump for {}", object_id, class_id),
            AnalysisWarning::SegmentAbandoned {
                segment_offset,
                skipped_bytes,
                error,
            } => write!(
                f,
                "heap-dump segment at offset {} abandoned ({} bytes skipped): {}",
                segment_offset, skipped_bytes, error
            ),
            AnalysisWarning::DominatorIterationCap {
                iterations,
                changed,
            } => write!(
                f,
                "dominator assignment not converged after {} passes ({} still changing)",
                iterations, changed
            ),
        }
    }
}
