use super::{Cache, CacheKind, CacheStatus};
use crate::array::NdArray;
use crate::error::{CacheError, PathError};
use crate::path::{self, Component, Path, PathComponent};
use crate::value::{ContainerKind, Scalar, Value};
use crate::Invariant;

/// Validity per element of an unstructured array, as a boolean mask of the same shape.
#[derive(Debug)]
pub struct TensorCache {
    value: Value,
    invalid: NdArray<bool>,
}

impl TensorCache {
    pub fn new(array: NdArray<Scalar>) -> Self {
        let invalid = NdArray::from_elem(array.shape(), true);
        Self {
            value: Value::Array(array),
            invalid,
        }
    }

    fn shape(&self) -> &[usize] {
        self.invalid.shape()
    }

    fn mask_of(&self, component: &Component) -> Result<NdArray<bool>, CacheError> {
        Ok(path::selection(self.shape(), component)?.to_mask(self.shape()))
    }
}

pub(super) fn mask_path(mask: NdArray<bool>, kind: ContainerKind) -> Path {
    let mut p = Path::root();
    p.push(PathComponent::with_kind(Component::Mask(mask), kind));
    p
}

impl Invariant for TensorCache {
    fn invariant(&self) {
        assert_eq!(self.value.shape().as_slice(), self.invalid.shape());
    }
}

impl Cache for TensorCache {
    fn kind(&self) -> CacheKind {
        CacheKind::Tensor
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn matches_result(&self, result: &Value) -> bool {
        matches!(result, Value::Array(a) if a.shape() == self.shape())
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
            self.invalid = NdArray::from_elem(self.shape(), false);
            return Ok(());
        };
        let mask = self.mask_of(first)?;
        self.value = path::set(&self.value, path, value)?;
        self.invalid = self.invalid.zip_and_not(&mask);
        Ok(())
    }

    fn set_invalid(&mut self, path: &[PathComponent]) -> Result<(), CacheError> {
        let first = path
            .first()
            .ok_or(CacheError::CannotInvalidateWholeShallowCache)?;
        let mask = self.mask_of(first)?;
        self.invalid = self.invalid.or(&mask).map_err(|e| CacheError::Mismatch(e.into()))?;
        Ok(())
    }

    fn uncached_paths(&self, path: &[PathComponent]) -> Result<Vec<Path>, CacheError> {
        let uncached = match path.first() {
            None => self.invalid.clone(),
            Some(first) => self
                .mask_of(first)?
                .and(&self.invalid)
                .map_err(|e| CacheError::Mismatch(e.into()))?,
        };
        Ok(if uncached.any() {
            vec![mask_path(uncached, ContainerKind::Tensor)]
        } else {
            Vec::new()
        })
    }

    fn status(&self) -> CacheStatus {
        CacheStatus::from_counts(self.invalid.count_true(), self.invalid.len())
    }
}
