//! Path translators: which parts of the sources a part of the result needs (backward), and
//! which parts of the result a change to a source affects (forward).

use std::collections::BTreeMap;

use crate::call::SourceLocation;
use crate::error::TranslationError;
use crate::path::Path;
use crate::runner::Strategy;
use crate::source::{ResultMeta, SourceCall};

mod axis;
pub(crate) mod codes;
mod elementwise;
mod getitem;
pub(crate) mod list_addition;
pub(crate) mod transpositional;
mod vectorize;
mod whole;

pub use axis::{AccumulationTranslator, ReductionTranslator};
pub use codes::{FOCAL_SOURCE_SCALAR, NON_CHOSEN_ELEMENT, OTHERS_ELEMENT};
pub use elementwise::ElementwiseTranslator;
pub use getitem::GetItemTranslator;
pub use list_addition::ListAdditionTranslator;
pub use transpositional::{Transposition, TranspositionalTranslator};
pub use vectorize::{CoreDims, VectorizeTranslator};
pub use whole::{ShapeOnlyTranslator, WholeValueTranslator};

#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    /// Only the shape and type of the source are needed.
    Shape,
    Path(Path),
}

/// For each source occurrence, what of it is needed. Absent data sources are shape-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Requirements(BTreeMap<usize, Requirement>);

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, occurrence: usize, requirement: Requirement) {
        self.0.insert(occurrence, requirement);
    }

    pub fn require(&mut self, occurrence: usize, path: Path) {
        self.insert(occurrence, Requirement::Path(path));
    }

    pub fn get(&self, occurrence: usize) -> Option<&Requirement> {
        self.0.get(&occurrence)
    }

    pub fn path(&self, occurrence: usize) -> Option<&Path> {
        match self.0.get(&occurrence) {
            Some(Requirement::Path(path)) => Some(path),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Requirement)> {
        self.0.iter().map(|(&k, v)| (k, v))
    }

    /// Every data source of `call` needed in full.
    pub fn everything(call: &SourceCall) -> Self {
        let mut out = Self::new();
        for (location, _) in call.source_locations() {
            if location.is_data {
                out.require(location.occurrence, Path::root());
            }
        }
        out
    }
}

pub trait BackwardTranslator: Strategy {
    /// What each data source must provide for the result to be valid at `path`.
    fn backward(
        &self,
        call: &SourceCall,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Requirements, TranslationError>;
}

pub trait ForwardTranslator: Strategy {
    /// The result paths affected by a change at `path` within the source at `source`.
    fn forward(
        &self,
        call: &SourceCall,
        source: &SourceLocation,
        path: &Path,
        meta: Option<&ResultMeta>,
    ) -> Result<Vec<Path>, TranslationError>;
}

pub(crate) fn require_meta(meta: Option<&ResultMeta>) -> Result<&ResultMeta, TranslationError> {
    meta.ok_or(TranslationError::MetadataUnknown)
}
