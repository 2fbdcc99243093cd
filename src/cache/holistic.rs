use super::{Cache, CacheKind, CacheStatus};
use crate::error::CacheError;
use crate::path::{Path, PathComponent};
use crate::value::Value;
use crate::Invariant;

/// All-or-nothing validity, for values with no addressable parts.
#[derive(Debug)]
pub struct HolisticCache {
    value: Value,
    valid: bool,
}

impl HolisticCache {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            valid: false,
        }
    }
}

fn reject_components(path: &[PathComponent]) -> Result<(), CacheError> {
    if path.is_empty() {
        Ok(())
    } else {
        Err(CacheError::PathCannotHaveComponents)
    }
}

impl Invariant for HolisticCache {
    fn invariant(&self) {}
}

impl Cache for HolisticCache {
    fn kind(&self) -> CacheKind {
        CacheKind::Holistic
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn matches_result(&self, _result: &Value) -> bool {
        true
    }

    fn set_valid(&mut self, path: &[PathComponent], value: Value) -> Result<(), CacheError> {
        reject_components(path)?;
        self.value = value;
        self.valid = true;
        Ok(())
    }

    fn set_invalid(&mut self, path: &[PathComponent]) -> Result<(), CacheError> {
        reject_components(path)?;
        self.valid = false;
        Ok(())
    }

    fn uncached_paths(&self, path: &[PathComponent]) -> Result<Vec<Path>, CacheError> {
        reject_components(path)?;
        Ok(if self.valid {
            Vec::new()
        } else {
            vec![Path::root()]
        })
    }

    fn status(&self) -> CacheStatus {
        if self.valid {
            CacheStatus::AllValid
        } else {
            CacheStatus::AllInvalid
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path;
    use test_log::test;

    #[test]
    fn holistic_only_takes_the_empty_path() {
        let mut cache = HolisticCache::new(Value::Int(0));
        assert_eq!(
            cache.set_valid(&path![0], Value::Int(1)),
            Err(CacheError::PathCannotHaveComponents)
        );
        cache.set_valid(&[], Value::Int(1)).unwrap();
        assert_eq!(cache.status(), CacheStatus::AllValid);
        assert_eq!(cache.value(), &Value::Int(1));
        assert!(cache.uncached_paths(&[]).unwrap().is_empty());
        cache.set_invalid(&[]).unwrap();
        assert_eq!(cache.uncached_paths(&[]).unwrap(), vec![Path::root()]);
    }
}
