use std::rc::Rc;

use super::tensor::mask_path;
use super::{Cache, CacheKind, CacheStatus};
use crate::array::NdArray;
use crate::error::{CacheError, PathError};
use crate::path::{self, Component, Path, PathComponent};
use crate::value::{ContainerKind, Record, Value};
use crate::Invariant;

fn record_of(value: &Value) -> Option<&Record> {
    match value {
        Value::Record(r) => Some(r),
        _ => None,
    }
}

fn same_layout(a: &Record, b: &Record) -> bool {
    a.shape() == b.shape() && a.field_names().eq(b.field_names())
}

fn mismatch(value: &Value) -> CacheError {
    CacheError::Mismatch(PathError::InvalidComponent {
        component: "[]".into(),
        ty: value.type_name(),
    })
}

/// One validity mask per field of a record array.
///
/// A path that names a field only ever touches that field's mask. A path that addresses
/// positions touches the same positions in every field.
#[derive(Debug)]
pub struct FieldTensorCache {
    value: Value,
    invalid: Vec<(Rc<str>, NdArray<bool>)>,
}

impl FieldTensorCache {
    pub fn new(record: Record) -> Self {
        let invalid = record
            .field_names()
            .map(|name| (name.clone(), NdArray::from_elem(record.shape(), true)))
            .collect();
        Self {
            value: Value::Record(record),
            invalid,
        }
    }

    fn record(&self) -> &Record {
        record_of(&self.value).unwrap_or_else(|| unreachable!("a field cache always holds a record"))
    }

    /// Which fields a path touches, and the element mask within each.
    fn affected(&self, path: &[PathComponent]) -> Result<Vec<(usize, NdArray<bool>)>, CacheError> {
        let shape = self.record().shape();
        let normalized = path::normalize(&self.value, path);
        let (fields, positions): (Vec<usize>, Option<&PathComponent>) = match normalized.first() {
            None => ((0..self.invalid.len()).collect(), None),
            Some(PathComponent {
                component: Component::Key(k),
                ..
            }) => {
                let index = self
                    .invalid
                    .iter()
                    .position(|(name, _)| name == k)
                    .ok_or_else(|| CacheError::Mismatch(PathError::KeyNotFound(k.clone())))?;
                (vec![index], normalized.get(1))
            }
            Some(first) => ((0..self.invalid.len()).collect(), Some(first)),
        };
        let mask = match positions {
            None => NdArray::from_elem(shape, true),
            Some(c) => path::selection(shape, c)?.to_mask(shape),
        };
        Ok(fields.into_iter().map(|f| (f, mask.clone())).collect())
    }
}

impl Invariant for FieldTensorCache {
    fn invariant(&self) {
        let record = self.record();
        assert_eq!(record.fields().len(), self.invalid.len());
        for (name, mask) in &self.invalid {
            assert!(record.has_field(name));
            assert_eq!(mask.shape(), record.shape());
        }
    }
}

impl Cache for FieldTensorCache {
    fn kind(&self) -> CacheKind {
        CacheKind::FieldTensor
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn matches_result(&self, result: &Value) -> bool {
        record_of(result).is_some_and(|r| same_layout(r, self.record()))
    }

    fn set_valid(&mut self, path: &[PathComponent], value: Value) -> Result<(), CacheError> {
        if path.is_empty() {
            if !self.matches_result(&value) {
                return Err(mismatch(&value));
            }
            self.value = value;
            for (_, mask) in self.invalid.iter_mut() {
                *mask = NdArray::from_elem(mask.shape(), false);
            }
            return Ok(());
        }
        let affected = self.affected(path)?;
        self.value = path::set(&self.value, path, value)?;
        for (field, mask) in affected {
            let invalid = &mut self.invalid[field].1;
            *invalid = invalid.zip_and_not(&mask);
        }
        Ok(())
    }

    fn set_invalid(&mut self, path: &[PathComponent]) -> Result<(), CacheError> {
        if path.is_empty() {
            return Err(CacheError::CannotInvalidateWholeShallowCache);
        }
        for (field, mask) in self.affected(path)? {
            let invalid = &mut self.invalid[field].1;
            *invalid = invalid.or(&mask).map_err(|e| CacheError::Mismatch(e.into()))?;
        }
        Ok(())
    }

    fn uncached_paths(&self, path: &[PathComponent]) -> Result<Vec<Path>, CacheError> {
        let mut out = Vec::new();
        for (field, mask) in self.affected(path)? {
            let (name, invalid) = &self.invalid[field];
            let uncached = mask.and(invalid).map_err(|e| CacheError::Mismatch(e.into()))?;
            if uncached.any() {
                let mut p = Path::root();
                p.push(PathComponent::with_kind(
                    Component::Key(name.clone()),
                    ContainerKind::FieldTensor,
                ));
                p = p.join(&mask_path(uncached, ContainerKind::FieldTensor));
                out.push(p);
            }
        }
        Ok(out)
    }

    fn status(&self) -> CacheStatus {
        let invalid = self.invalid.iter().map(|(_, m)| m.count_true()).sum();
        let total = self.invalid.iter().map(|(_, m)| m.len()).sum();
        CacheStatus::from_counts(invalid, total)
    }
}

/// A zero-dimensional record: indexable by field, yet a single element.
#[derive(Debug)]
pub struct ScalarStructuredCache {
    value: Value,
    invalid: Vec<(Rc<str>, bool)>,
}

impl ScalarStructuredCache {
    pub fn new(record: Record) -> Self {
        let invalid = record.field_names().map(|name| (name.clone(), true)).collect();
        Self {
            value: Value::Record(record),
            invalid,
        }
    }

    fn fields_at(&self, component: &Component) -> Result<Vec<usize>, CacheError> {
        match component {
            Component::Key(k) => self
                .invalid
                .iter()
                .position(|(name, _)| name == k)
                .map(|i| vec![i])
                .ok_or_else(|| CacheError::Mismatch(PathError::KeyNotFound(k.clone()))),
            Component::Everything => Ok((0..self.invalid.len()).collect()),
            Component::Tuple(axes) if axes.is_empty() => Ok((0..self.invalid.len()).collect()),
            other => Err(CacheError::Mismatch(PathError::InvalidComponent {
                component: other.to_string(),
                ty: "zero-dimensional record",
            })),
        }
    }
}

impl Invariant for ScalarStructuredCache {
    fn invariant(&self) {
        let record = record_of(&self.value).expect("a scalar cache always holds a record");
        assert!(record.shape().is_empty());
        assert_eq!(record.fields().len(), self.invalid.len());
    }
}

impl Cache for ScalarStructuredCache {
    fn kind(&self) -> CacheKind {
        CacheKind::ScalarStructured
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn matches_result(&self, result: &Value) -> bool {
        match (record_of(result), record_of(&self.value)) {
            (Some(r), Some(mine)) => same_layout(r, mine),
            _ => false,
        }
    }

    fn set_valid(&mut self, path: &[PathComponent], value: Value) -> Result<(), CacheError> {
        let Some(first) = path.first() else {
            if !self.matches_result(&value) {
                return Err(mismatch(&value));
            }
            self.value = value;
            self.invalid.iter_mut().for_each(|(_, b)| *b = false);
            return Ok(());
        };
        let fields = self.fields_at(first)?;
        self.value = path::set(&self.value, path, value)?;
        for f in fields {
            self.invalid[f].1 = false;
        }
        Ok(())
    }

    fn set_invalid(&mut self, path: &[PathComponent]) -> Result<(), CacheError> {
        let first = path
            .first()
            .ok_or(CacheError::CannotInvalidateWholeShallowCache)?;
        for f in self.fields_at(first)? {
            self.invalid[f].1 = true;
        }
        Ok(())
    }

    fn uncached_paths(&self, path: &[PathComponent]) -> Result<Vec<Path>, CacheError> {
        let fields = match path.first() {
            None => (0..self.invalid.len()).collect(),
            Some(first) => self.fields_at(first)?,
        };
        Ok(fields
            .into_iter()
            .filter(|&f| self.invalid[f].1)
            .map(|f| {
                let mut p = Path::root();
                p.push(PathComponent::with_kind(
                    Component::Key(self.invalid[f].0.clone()),
                    ContainerKind::FieldTensor,
                ));
                p
            })
            .collect())
    }

    fn status(&self) -> CacheStatus {
        let invalid = self.invalid.iter().filter(|(_, b)| *b).count();
        CacheStatus::from_counts(invalid, self.invalid.len())
    }
}
