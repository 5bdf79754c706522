//! Tumor categories predicted by both classifiers.
//!
//! The index order matches the output layer of the pretrained weights and
//! must not change.

use serde::{Deserialize, Serialize};

/// Number of output classes
pub const NUM_CLASSES: usize = 4;

/// A brain tumor category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TumorClass {
    Glioma,
    Meningioma,
    NoTumor,
    Pituitary,
}

impl TumorClass {
    /// All classes in output-layer order
    pub const ALL: [TumorClass; NUM_CLASSES] = [
        TumorClass::Glioma,
        TumorClass::Meningioma,
        TumorClass::NoTumor,
        TumorClass::Pituitary,
    ];

    /// Class for an output index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Output index of this class
    pub fn index(self) -> usize {
        match self {
            TumorClass::Glioma => 0,
            TumorClass::Meningioma => 1,
            TumorClass::NoTumor => 2,
            TumorClass::Pituitary => 3,
        }
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            TumorClass::Glioma => "Glioma",
            TumorClass::Meningioma => "Meningioma",
            TumorClass::NoTumor => "No tumor",
            TumorClass::Pituitary => "Pituitary",
        }
    }
}

impl std::fmt::Display for TumorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
