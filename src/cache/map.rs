use im_rc::{OrdMap, OrdSet};
use std::rc::Rc;

use super::{Cache, CacheKind, CacheStatus};
use crate::error::{CacheError, PathError};
use crate::path::{self, Component, Path, PathComponent};
use crate::value::{ContainerKind, Value};
use crate::Invariant;

/// Validity per key of an associative value.
#[derive(Debug)]
pub struct MapCache {
    value: Value,
    invalid: OrdSet<Rc<str>>,
}

fn entries(value: &Value) -> Option<&OrdMap<Rc<str>, Value>> {
    match value {
        Value::Map(m) => Some(m),
        _ => None,
    }
}

fn mismatch(component: impl ToString, ty: &'static str) -> CacheError {
    CacheError::Mismatch(PathError::InvalidComponent {
        component: component.to_string(),
        ty,
    })
}

impl MapCache {
    pub fn new(map: OrdMap<Rc<str>, Value>) -> Self {
        let invalid = map.keys().cloned().collect();
        Self {
            value: Value::Map(map),
            invalid,
        }
    }

    fn map(&self) -> &OrdMap<Rc<str>, Value> {
        match &self.value {
            Value::Map(m) => m,
            _ => unreachable!("a map cache always holds a map"),
        }
    }

    fn keys_at(&self, component: &Component) -> Result<Vec<Rc<str>>, CacheError> {
        match component {
            Component::Key(k) => Ok(vec![k.clone()]),
            Component::Everything => Ok(self.map().keys().cloned().collect()),
            other => Err(mismatch(other, "map")),
        }
    }
}

impl Invariant for MapCache {
    fn invariant(&self) {
        assert!(entries(&self.value).is_some());
        for key in self.invalid.iter() {
            assert!(self.map().contains_key(key));
        }
    }
}

impl Cache for MapCache {
    fn kind(&self) -> CacheKind {
        CacheKind::Map
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn matches_result(&self, result: &Value) -> bool {
        match entries(result) {
            Some(m) => m.len() == self.map().len() && m.keys().all(|k| self.map().contains_key(k)),
            None => false,
        }
    }

    fn set_valid(&mut self, path: &[PathComponent], value: Value) -> Result<(), CacheError> {
        let Some(first) = path.first() else {
            if entries(&value).is_none() {
                return Err(mismatch("[]", value.type_name()));
            }
            self.value = value;
            self.invalid = OrdSet::new();
            return Ok(());
        };
        let keys = self.keys_at(first)?;
        self.value = path::set(&self.value, path, value)?;
        for key in keys {
            self.invalid.remove(&key);
        }
        Ok(())
    }

    fn set_invalid(&mut self, path: &[PathComponent]) -> Result<(), CacheError> {
        let first = path
            .first()
            .ok_or(CacheError::CannotInvalidateWholeShallowCache)?;
        for key in self.keys_at(first)? {
            if self.map().contains_key(&key) {
                self.invalid.insert(key);
            }
        }
        Ok(())
    }

    fn uncached_paths(&self, path: &[PathComponent]) -> Result<Vec<Path>, CacheError> {
        let keys: Vec<Rc<str>> = match path.first() {
            None => self.invalid.iter().cloned().collect(),
            Some(first) => self
                .keys_at(first)?
                .into_iter()
                .filter(|k| self.invalid.contains(k) || !self.map().contains_key(k))
                .collect(),
        };
        Ok(keys
            .into_iter()
            .map(|k| {
                let mut p = Path::root();
                p.push(PathComponent::with_kind(Component::Key(k), ContainerKind::Map));
                p
            })
            .collect())
    }

    fn status(&self) -> CacheStatus {
        CacheStatus::from_counts(self.invalid.len(), self.map().len())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path;
    use test_log::test;

    #[test]
    fn keys_become_valid_one_at_a_time() {
        let Value::Map(value) = Value::map([("a", 1), ("b", 2)]) else {
            unreachable!()
        };
        let mut cache = MapCache::new(value);
        cache.set_valid(&path!["a"], Value::Int(10)).unwrap();
        assert_eq!(cache.status(), CacheStatus::Partial);
        assert_eq!(cache.uncached_paths(&[]).unwrap(), vec![path!["b"]]);
        assert!(cache.uncached_paths(&path!["a"]).unwrap().is_empty());
        assert_eq!(path::get(cache.value(), &path!["a"]).unwrap(), Value::Int(10));
        cache.set_valid(&path!["b"], Value::Int(20)).unwrap();
        assert_eq!(cache.status(), CacheStatus::AllValid);
    }

    #[test]
    fn whole_invalidation_is_refused() {
        let Value::Map(value) = Value::map([("a", 1)]) else {
            unreachable!()
        };
        let mut cache = MapCache::new(value);
        assert_eq!(
            cache.set_invalid(&[]),
            Err(CacheError::CannotInvalidateWholeShallowCache)
        );
        assert!(!cache.matches_result(&Value::map([("b", 1)])));
        assert!(cache.matches_result(&Value::map([("a", 5)])));
    }
}
