//! Error types for surfmesh.
//!
//! Every fallible operation in the crate returns [`Result`]. The first four
//! variants form the engine's own taxonomy; the rest cover construction,
//! file I/O and parameter validation.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur during mesh operations.
#[derive(Error, Debug)]
pub enum MeshError {
    /// An edit would break the manifold or orientation invariant.
    ///
    /// The edit is rejected and the mesh is left unchanged.
    #[error("topology error: {details}")]
    Topology {
        /// What the edit would have violated.
        details: String,
    },

    /// An input mesh is not a closed, consistently oriented 2-manifold.
    ///
    /// Raised before any mutation takes place.
    #[error("input is not a closed 2-manifold: {details}")]
    NonManifoldInput {
        /// Which precondition failed.
        details: String,
    },

    /// A single edge collapse was refused.
    ///
    /// Batch operations skip the edge and continue with the remaining ones.
    #[error("edge {edge} cannot be collapsed: {reason}")]
    NonCollapsible {
        /// Index of the refused edge.
        edge: usize,
        /// Why the collapse was refused.
        reason: &'static str,
    },

    /// A triangulation or reconstruction step met a degenerate configuration.
    #[error("degenerate geometry: {details}")]
    DegenerateGeometry {
        /// Description of the configuration.
        details: String,
    },

    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face repeats a vertex or has fewer than three corners.
    #[error("face {face} is degenerate (fewer than three distinct vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// A directed edge is used by more than one face.
    #[error("edge ({v0}, {v1}) is used twice with the same orientation")]
    NonManifoldEdge {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading mesh from file.
    #[error("failed to load mesh from {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving mesh to file.
    #[error("failed to save mesh to {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Iterative solver did not reach its tolerance.
    #[error("algorithm failed to converge after {iterations} iterations")]
    ConvergenceFailed {
        /// Number of iterations attempted.
        iterations: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a topology error.
    pub fn topology(details: impl Into<String>) -> Self {
        MeshError::Topology {
            details: details.into(),
        }
    }

    /// Create a non-manifold input error.
    pub fn non_manifold_input(details: impl Into<String>) -> Self {
        MeshError::NonManifoldInput {
            details: details.into(),
        }
    }

    /// Create a degenerate geometry error.
    pub fn degenerate(details: impl Into<String>) -> Self {
        MeshError::DegenerateGeometry {
            details: details.into(),
        }
    }

    /// Whether this error only rejects a single local edit.
    ///
    /// Batch algorithms use this to decide between skipping and aborting.
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            MeshError::NonCollapsible { .. } | MeshError::Topology { .. }
        )
    }
}
