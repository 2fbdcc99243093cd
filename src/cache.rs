//! Partial validity tracking for node results.
//!
//! Every cache holds the last computed value and a validity descriptor shaped like that
//! value. All caches except [`HolisticCache`] are *shallow*: validity is tracked one
//! container level deep (per key, per index, per tensor element).

use std::fmt;

use crate::error::CacheError;
use crate::path::{self, Path, PathComponent};
use crate::value::Value;
use crate::Invariant;

mod fielded;
mod holistic;
mod map;
mod sequence;
mod tensor;

pub use fielded::{FieldTensorCache, ScalarStructuredCache};
pub use holistic::HolisticCache;
pub use map::MapCache;
pub use sequence::SequenceCache;
pub use tensor::TensorCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    AllInvalid,
    AllValid,
    Partial,
}

impl CacheStatus {
    pub(crate) fn from_counts(invalid: usize, total: usize) -> Self {
        if invalid == 0 {
            CacheStatus::AllValid
        } else if invalid == total {
            CacheStatus::AllInvalid
        } else {
            CacheStatus::Partial
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Holistic,
    Map,
    Sequence,
    Tensor,
    FieldTensor,
    ScalarStructured,
}

pub trait Cache: fmt::Debug + Invariant {
    fn kind(&self) -> CacheKind;

    /// The last stored value. Parts of it may be stale.
    fn value(&self) -> &Value;

    /// Whether a freshly computed result has the structure this cache was built for.
    fn matches_result(&self, result: &Value) -> bool;

    /// Store `value` (the value found at `path`) and mark `path` valid.
    fn set_valid(&mut self, path: &[PathComponent], value: Value) -> Result<(), CacheError>;

    fn set_invalid(&mut self, path: &[PathComponent]) -> Result<(), CacheError>;

    /// Sub-paths of `path` that hold no valid data.
    fn uncached_paths(&self, path: &[PathComponent]) -> Result<Vec<Path>, CacheError>;

    fn status(&self) -> CacheStatus;
}

/// A fresh, all-invalid cache suited to the structure of `value`.
pub fn create_cache(value: &Value) -> Box<dyn Cache> {
    match value {
        Value::Map(m) => Box::new(MapCache::new(m.clone())),
        Value::List(_) | Value::Tuple(_) => Box::new(SequenceCache::new(value)),
        Value::Array(a) if a.ndim() > 0 => Box::new(TensorCache::new(a.clone())),
        Value::Record(r) if r.shape().is_empty() => Box::new(ScalarStructuredCache::new(r.clone())),
        Value::Record(r) => Box::new(FieldTensorCache::new(r.clone())),
        other => Box::new(HolisticCache::new(other.clone())),
    }
}

/// Cut a path down to the depth a shallow cache of `value` can record.
pub fn truncate_path_to_shallow(path: &[PathComponent], value: &Value) -> Path {
    let normalized = path::normalize(value, path);
    match value {
        Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => {
            Path::root()
        }
        Value::Array(a) if a.ndim() == 0 => Path::root(),
        Value::Record(r) if !r.shape().is_empty() && normalized.first().is_some_and(|c| c.is_key()) => {
            normalized.truncated(2)
        }
        _ => normalized.truncated(1),
    }
}

/// Uncached paths within `path`, treating a missing or mismatched cache as "all of it".
pub fn uncached_paths_matching(cache: Option<&dyn Cache>, path: &[PathComponent]) -> Vec<Path> {
    let Some(cache) = cache else {
        return vec![path.into()];
    };
    let normalized = path::normalize(cache.value(), path);
    match cache.uncached_paths(&normalized) {
        Ok(paths) => paths,
        Err(CacheError::PathCannotHaveComponents) => match cache.uncached_paths(&[]) {
            Ok(paths) if paths.is_empty() => Vec::new(),
            _ => vec![path.into()],
        },
        Err(e) => {
            tracing::trace!(%e, "cache cannot answer for {:?}", normalized);
            vec![path.into()]
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path;
    use test_log::test;

    #[test]
    fn variants_follow_value_structure() {
        assert_eq!(create_cache(&Value::Int(1)).kind(), CacheKind::Holistic);
        assert_eq!(create_cache(&Value::from(vec![1])).kind(), CacheKind::Sequence);
        assert_eq!(create_cache(&Value::map([("a", 1)])).kind(), CacheKind::Map);
        let array = Value::array(&[2], vec![1i64, 2]).unwrap();
        assert_eq!(create_cache(&array).kind(), CacheKind::Tensor);
    }

    #[test]
    fn new_caches_are_all_invalid() {
        for value in [
            Value::Int(1),
            Value::from(vec![1, 2]),
            Value::map([("a", 1)]),
            Value::array(&[2, 2], vec![1i64, 2, 3, 4]).unwrap(),
        ] {
            assert_eq!(create_cache(&value).status(), CacheStatus::AllInvalid);
        }
    }

    #[test]
    fn missing_cache_needs_everything() {
        assert_eq!(uncached_paths_matching(None, &path![1]), vec![path![1]]);
    }

    #[test]
    fn truncation() {
        let array = Value::array(&[2, 2], vec![1i64, 2, 3, 4]).unwrap();
        assert_eq!(truncate_path_to_shallow(&path![0, 1], &array), path![[0, 1]]);
        let list = Value::from(vec![vec![1, 2]]);
        assert_eq!(truncate_path_to_shallow(&path![0, 1], &list), path![0]);
        assert!(truncate_path_to_shallow(&path![0], &Value::Int(3)).is_root());
    }
}
