// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file,
// You can obtain one at <https://mozilla.org/MPL/2.0/>.

use thiserror::Error;

/// Errors raised while building or driving an atom group.
///
/// Configuration problems are detected when a group is constructed and are
/// fatal to that group. Operations that need per-atom data on a dummy group
/// fail with [`AtomGroupError::DummyGroup`].
#[derive(Debug, Error)]
pub enum AtomGroupError {
    // Configuration errors
    #[error("Atom group has no atoms and is not a dummy group")]
    EmptyGroup,

    #[error("Atom id {id} is not known to the host")]
    UnknownAtom { id: usize },

    #[error("Expected {expected} reference positions (one per fitting atom), found {found}")]
    ReferenceCountMismatch { expected: usize, found: usize },

    #[error("Centering or rotation requested but no reference positions were given")]
    MissingReferencePositions,

    #[error("Expected {expected} weights (one per atom), found {found}")]
    WeightCountMismatch { expected: usize, found: usize },

    #[error("Total mass of the group must be positive, found {total}")]
    NonPositiveTotalMass { total: f64 },

    #[error("Total weight of the group must be positive, found {total}")]
    NonPositiveTotalWeight { total: f64 },

    #[error("Unknown fitting group '{name}'")]
    UnknownFittingGroup { name: String },

    #[error("An atom group named '{name}' already exists")]
    DuplicateGroupName { name: String },

    #[error("Invalid atom group configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Invalid operations
    #[error("Operation '{operation}' is not supported on a dummy atom group")]
    DummyGroup { operation: &'static str },

    #[error("Expected {expected} forces (one per atom), found {found}")]
    ForceCountMismatch { expected: usize, found: usize },

    #[error("Expected {expected} gradients (one per atom), found {found}")]
    GradientCountMismatch { expected: usize, found: usize },

    #[error("Cannot add atoms to a group that fits against its own reference positions")]
    CannotResizeFittedGroup,
}

pub type Result<T> = std::result::Result<T, AtomGroupError>;

// End of File
