use super::{Cache, CacheKind, CacheStatus};
use crate::array::{normalize_index, AxisIndex, Slice};
use crate::error::{CacheError, PathError};
use crate::path::{self, Component, Path, PathComponent};
use crate::value::{ContainerKind, Value};
use crate::Invariant;

/// Validity per index of a list or tuple.
#[derive(Debug)]
pub struct SequenceCache {
    value: Value,
    invalid: Vec<bool>,
}

impl SequenceCache {
    pub fn new(value: &Value) -> Self {
        let len = value.as_sequence().map_or(0, |s| s.len());
        Self {
            value: value.clone(),
            invalid: vec![true; len],
        }
    }

    fn len(&self) -> usize {
        self.invalid.len()
    }

    /// The first-level positions a component touches. Out-of-range references touch nothing.
    fn positions(&self, component: &Component) -> Result<Vec<usize>, CacheError> {
        let len = self.len();
        let of_axis = |axis: &AxisIndex| match axis {
            AxisIndex::Index(i) => normalize_index(*i, len).map(|i| vec![i]).unwrap_or_default(),
            AxisIndex::Slice(s) => s.indices(len),
        };
        Ok(match component {
            Component::Index(i) => of_axis(&AxisIndex::Index(*i)),
            Component::Slice(s) => of_axis(&AxisIndex::Slice(*s)),
            Component::Tuple(axes) => match axes.first() {
                Some(axis) => of_axis(axis),
                None => of_axis(&AxisIndex::Slice(Slice::full())),
            },
            Component::Mask(mask) => {
                let first = if mask.ndim() > 1 {
                    let trailing: Vec<usize> = (1..mask.ndim()).collect();
                    mask.any_axes(&trailing, false)
                        .map_err(|e| CacheError::Mismatch(e.into()))?
                } else {
                    mask.clone()
                };
                first
                    .iter()
                    .enumerate()
                    .filter(|(i, b)| **b && *i < len)
                    .map(|(i, _)| i)
                    .collect()
            }
            Component::Everything => (0..len).collect(),
            other => {
                return Err(CacheError::Mismatch(PathError::InvalidComponent {
                    component: other.to_string(),
                    ty: "sequence",
                }))
            }
        })
    }
}

impl Invariant for SequenceCache {
    fn invariant(&self) {
        assert_eq!(self.value.as_sequence().map(|s| s.len()), Some(self.invalid.len()));
    }
}

impl Cache for SequenceCache {
    fn kind(&self) -> CacheKind {
        CacheKind::Sequence
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn matches_result(&self, result: &Value) -> bool {
        result.ty() == self.value.ty() && result.as_sequence().map(|s| s.len()) == Some(self.len())
    }

    fn set_valid(&mut self, path: &[PathComponent], value: Value) -> Result<(), CacheError> {
        let Some(first) = path.first() else {
            if !self.matches_result(&value) {
                return Err(CacheError::Mismatch(PathError::InvalidComponent {
                    component: "[]".into(),
                    ty: value.type_name(),
                }));
            }
            self.value = value;
            self.invalid.iter_mut().for_each(|b| *b = false);
            return Ok(());
        };
        let positions = self.positions(first)?;
        if positions.is_empty() {
            return Ok(());
        }
        match path::set(&self.value, path, value) {
            Ok(updated) => self.value = updated,
            Err(e) if e.is_out_of_range() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        for i in positions {
            self.invalid[i] = false;
        }
        Ok(())
    }

    fn set_invalid(&mut self, path: &[PathComponent]) -> Result<(), CacheError> {
        let first = path
            .first()
            .ok_or(CacheError::CannotInvalidateWholeShallowCache)?;
        for i in self.positions(first)? {
            self.invalid[i] = true;
        }
        Ok(())
    }

    fn uncached_paths(&self, path: &[PathComponent]) -> Result<Vec<Path>, CacheError> {
        let positions = match path.first() {
            None => (0..self.len()).collect(),
            Some(first) => self.positions(first)?,
        };
        Ok(positions
            .into_iter()
            .filter(|&i| self.invalid[i])
            .map(|i| {
                let mut p = Path::root();
                p.push(PathComponent::with_kind(
                    Component::Index(i as isize),
                    ContainerKind::Sequence,
                ));
                p
            })
            .collect())
    }

    fn status(&self) -> CacheStatus {
        let invalid = self.invalid.iter().filter(|&&b| b).count();
        CacheStatus::from_counts(invalid, self.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path;
    use test_log::test;

    #[test]
    fn indices_and_slices() {
        let mut cache = SequenceCache::new(&Value::from(vec![0, 0, 0, 0]));
        cache.set_valid(&path![1], Value::Int(5)).unwrap();
        assert_eq!(
            cache.uncached_paths(&[]).unwrap(),
            vec![path![0], path![2], path![3]]
        );
        cache
            .set_valid(&path![Slice::new(Some(2), None, None)], Value::from(vec![7, 8]))
            .unwrap();
        assert_eq!(cache.value(), &Value::from(vec![0, 5, 7, 8]));
        assert_eq!(cache.status(), CacheStatus::Partial);
        cache.set_invalid(&path![-1]).unwrap();
        assert_eq!(cache.uncached_paths(&path![3]).unwrap(), vec![path![3]]);
    }

    #[test]
    fn out_of_range_is_silently_ignored() {
        let mut cache = SequenceCache::new(&Value::from(vec![1, 2]));
        cache.set_valid(&path![5], Value::Int(1)).unwrap();
        cache.set_invalid(&path![5]).unwrap();
        assert_eq!(cache.status(), CacheStatus::AllInvalid);
        assert_eq!(cache.value(), &Value::from(vec![1, 2]));
    }

    #[test]
    fn tuple_references_select_the_first_dimension() {
        let mut cache = SequenceCache::new(&Value::from(vec![vec![1, 2], vec![3, 4]]));
        cache.set_valid(&[], Value::from(vec![vec![1, 2], vec![3, 4]])).unwrap();
        cache.set_invalid(&path![[1, 0]]).unwrap();
        assert_eq!(cache.uncached_paths(&[]).unwrap(), vec![path![1]]);
    }

    #[test]
    fn length_changes_do_not_match() {
        let cache = SequenceCache::new(&Value::from(vec![1, 2]));
        assert!(!cache.matches_result(&Value::from(vec![1, 2, 3])));
        assert!(!cache.matches_result(&Value::tuple([1, 2])));
        assert!(cache.matches_result(&Value::from(vec![3, 4])));
    }
}
