use im_rc::Vector;
use smallvec::SmallVec;

use super::{Component, Path, PathComponent};
use crate::array::{AxisIndex, NdArray, Selection};
use crate::error::PathError;
use crate::value::{ContainerKind, Scalar, Value};

fn invalid(component: &Component, value: &Value) -> PathError {
    PathError::InvalidComponent {
        component: component.to_string(),
        ty: value.type_name(),
    }
}

/// The positions a tensor component picks from an array of `shape`.
pub(crate) fn selection(shape: &[usize], component: &Component) -> Result<Selection, PathError> {
    let layout = NdArray::from_elem(shape, ());
    match component {
        Component::Everything => Ok(layout.select_all()),
        Component::Mask(mask) => layout.select_mask(mask),
        other => match other.as_axis_indices() {
            Some(items) => layout.select_axes(&items),
            None => Err(PathError::InvalidComponent {
                component: other.to_string(),
                ty: "array",
            }),
        },
    }
}

fn element_or_array(array: NdArray<Scalar>) -> Value {
    if array.ndim() == 0 {
        Value::from(array.data()[0])
    } else {
        Value::Array(array)
    }
}

fn rebuild_sequence(like: &Value, items: Vector<Value>) -> Value {
    match like {
        Value::Tuple(_) => Value::Tuple(items),
        _ => Value::List(items),
    }
}

/// Indices of a flat sequence picked by a component, when it can be done without an array view.
fn sequence_positions(component: &Component, len: usize) -> Option<Result<Vec<usize>, PathError>> {
    match component {
        Component::Index(i) => Some(crate::array::normalize_index(*i, len).map(|i| vec![i])),
        Component::Slice(s) => Some(Ok(s.indices(len))),
        Component::Everything => Some(Ok((0..len).collect())),
        Component::Tuple(items) if items.len() == 1 => match items[0] {
            AxisIndex::Index(i) => {
                Some(crate::array::normalize_index(i, len).map(|i| vec![i]))
            }
            AxisIndex::Slice(s) => Some(Ok(s.indices(len))),
        },
        Component::Mask(mask) if mask.ndim() == 1 && mask.len() == len => Some(Ok(mask
            .iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .map(|(i, _)| i)
            .collect())),
        _ => None,
    }
}

/// Read one component out of a value.
pub(crate) fn get_component(value: &Value, component: &Component) -> Result<Value, PathError> {
    match (value, component) {
        (_, Component::OutOfArray) => Ok(value.clone()),
        (Value::Map(map), Component::Key(k)) => map
            .get(k)
            .cloned()
            .ok_or_else(|| PathError::KeyNotFound(k.clone())),
        (Value::Map(_), Component::Everything) => Ok(value.clone()),
        (Value::List(items) | Value::Tuple(items), c) => {
            if let Component::Index(i) = c {
                let i = crate::array::normalize_index(*i, items.len())?;
                return Ok(items[i].clone());
            }
            if let Component::Tuple(axes) = c {
                if axes.iter().all(|a| matches!(a, AxisIndex::Index(_))) {
                    let mut current = value.clone();
                    for axis in axes {
                        if let AxisIndex::Index(i) = axis {
                            current = get_component(&current, &Component::Index(*i))?;
                        }
                    }
                    return Ok(current);
                }
            }
            match sequence_positions(c, items.len()) {
                Some(positions) => Ok(rebuild_sequence(
                    value,
                    positions?.into_iter().map(|i| items[i].clone()).collect(),
                )),
                None if c.is_tensor() => {
                    let array = value.to_array()?;
                    let picked = array.take(&selection(array.shape(), c)?);
                    Ok(Value::from_array_as_list(&picked))
                }
                None => Err(invalid(c, value)),
            }
        }
        (Value::Array(array), c) if c.is_tensor() => {
            Ok(element_or_array(array.take(&selection(array.shape(), c)?)))
        }
        (Value::Record(record), Component::Key(k)) => record
            .field(k)
            .cloned()
            .map(element_or_array)
            .ok_or_else(|| PathError::KeyNotFound(k.clone())),
        (Value::Record(record), c) if c.is_tensor() => {
            Ok(Value::Record(record.take(&selection(record.shape(), c)?)))
        }
        (_, Component::Everything) => Ok(value.clone()),
        (_, c) => Err(invalid(c, value)),
    }
}

/// Replace what one component addresses, returning the new container.
pub(crate) fn set_component(
    value: &Value,
    component: &Component,
    new: Value,
) -> Result<Value, PathError> {
    match (value, component) {
        (_, Component::OutOfArray) => Ok(value.clone()),
        (Value::Map(map), Component::Key(k)) => Ok(Value::Map(map.update(k.clone(), new))),
        (Value::List(items) | Value::Tuple(items), c) => {
            match sequence_positions(c, items.len()) {
                Some(positions) => {
                    let positions = positions?;
                    let single = matches!(c, Component::Index(_))
                        || matches!(c, Component::Tuple(t) if matches!(t[..], [AxisIndex::Index(_)]));
                    let mut items = items.clone();
                    if single {
                        items.set(positions[0], new);
                    } else {
                        let incoming: Vec<Value> = match &new {
                            Value::List(v) | Value::Tuple(v) if v.len() == positions.len() => {
                                v.iter().cloned().collect()
                            }
                            Value::Array(a) if a.ndim() == 1 && a.len() == positions.len() => {
                                a.iter().map(|&s| Value::from(s)).collect()
                            }
                            other => vec![other.clone(); positions.len()],
                        };
                        for (position, item) in positions.into_iter().zip(incoming) {
                            items.set(position, item);
                        }
                    }
                    Ok(rebuild_sequence(value, items))
                }
                None if c.is_tensor() => {
                    if let Component::Tuple(axes) = c {
                        if let Some((AxisIndex::Index(first), rest)) = axes.split_first() {
                            let head = Component::Index(*first);
                            let inner = get_component(value, &head)?;
                            let rest = Component::Tuple(rest.to_vec());
                            let updated = set_component(&inner, &rest, new)?;
                            return set_component(value, &head, updated);
                        }
                    }
                    let mut array = value.to_array()?;
                    let sel = selection(array.shape(), c)?;
                    array.put(&sel, &new.to_array()?)?;
                    Ok(Value::from_array_as_list(&array))
                }
                None => Err(invalid(c, value)),
            }
        }
        (Value::Array(array), c) if c.is_tensor() => {
            let sel = selection(array.shape(), c)?;
            let mut array = array.clone();
            array.put(&sel, &new.to_array()?)?;
            Ok(Value::Array(array))
        }
        (Value::Record(record), Component::Key(k)) => {
            let mut record = record.clone();
            let shape: SmallVec<[usize; 4]> = record.shape().into();
            let field = record
                .field_mut(k)
                .ok_or_else(|| PathError::KeyNotFound(k.clone()))?;
            *field = new.to_array()?.broadcast_to(&shape)?;
            Ok(Value::Record(record))
        }
        (Value::Record(record), c) if c.is_tensor() => {
            let sel = selection(record.shape(), c)?;
            let Value::Record(incoming) = &new else {
                return Err(invalid(c, &new));
            };
            let mut record = record.clone();
            record.put(&sel, incoming)?;
            Ok(Value::Record(record))
        }
        (_, Component::Everything) => Ok(new),
        (_, c) => Err(invalid(c, value)),
    }
}

/// Index into `value` one component at a time.
pub fn get(value: &Value, path: &[PathComponent]) -> Result<Value, PathError> {
    let mut current = value.clone();
    for component in path {
        current = get_component(&current, component)?;
    }
    Ok(current)
}

/// A copy of `value` with whatever `path` addresses replaced by `new`.
pub fn set(value: &Value, path: &[PathComponent], new: Value) -> Result<Value, PathError> {
    match path.split_first() {
        None => Ok(new),
        Some((first, [])) => set_component(value, first, new),
        Some((first, rest)) => {
            let inner = get_component(value, first)?;
            let updated = set(&inner, rest, new)?;
            set_component(value, first, updated)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    /// The part of the path that stays within the value's own structure.
    pub inside: Path,
    /// The part that continues into an element extracted out of an array.
    pub remaining: Path,
    pub value: Value,
}

/// Separate a path at the point where it leaves the outer object.
///
/// Maps and sequences are walked through. An array or record stops the walk as soon as a
/// component extracts a single element from it.
pub fn split(value: &Value, path: &[PathComponent]) -> Result<Split, PathError> {
    let mut current = value.clone();
    for (i, component) in path.iter().enumerate() {
        let extracts = match &current {
            Value::Array(a) => {
                component.is_tensor() && selection(a.shape(), component)?.is_element()
            }
            Value::Record(r) => {
                component.is_key() && r.shape().is_empty()
                    || component.is_tensor() && selection(r.shape(), component)?.is_element()
            }
            Value::Map(_) | Value::List(_) | Value::Tuple(_) => false,
            _ => {
                return Ok(Split {
                    inside: path[..i].into(),
                    remaining: path[i..].into(),
                    value: current,
                })
            }
        };
        current = get_component(&current, component)?;
        if extracts {
            return Ok(Split {
                inside: path[..=i].into(),
                remaining: path[i + 1..].into(),
                value: current,
            });
        }
    }
    Ok(Split {
        inside: path.into(),
        remaining: Path::root(),
        value: current,
    })
}

/// Rewrite a path into the form caches expect.
///
/// On a record, `[index, field]` becomes `[field, index]`. On an array, an integer reference
/// followed by more tensor components merges into one tuple reference.
pub fn normalize(value: &Value, path: &[PathComponent]) -> Path {
    let mut out: Vec<PathComponent> = path.to_vec();
    if let Value::Record(_) = value {
        if let [first, second, ..] = &out[..] {
            if first.is_tensor() && second.is_key() {
                out.swap(0, 1);
            }
        }
    }
    let tensor_at = match (value, out.first()) {
        (Value::Array(_), _) => Some(0),
        (Value::Record(_), Some(first)) if first.is_key() => Some(1),
        (Value::Record(_), _) => Some(0),
        _ => None,
    };
    if let Some(start) = tensor_at {
        while out.len() > start + 1 {
            let head = out[start].as_axis_indices();
            let tail = out[start + 1].as_axis_indices();
            let merged = match (head, tail) {
                (Some(head), Some(tail))
                    if head.iter().all(|x| matches!(x, AxisIndex::Index(_))) =>
                {
                    let mut items: Vec<AxisIndex> = head.into_iter().collect();
                    items.extend(tail);
                    Some(items)
                }
                _ => None,
            };
            match merged {
                Some(items) => {
                    let kind = out[start].indexed_kind;
                    out[start] = PathComponent {
                        component: Component::Tuple(items),
                        indexed_kind: kind.or(Some(ContainerKind::Tensor)),
                    };
                    out.remove(start + 1);
                }
                None => break,
            }
        }
    }
    out.into()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::array::Slice;
    use crate::path;
    use test_log::test;

    #[test]
    fn get_through_nested_containers() {
        let v = Value::map([("a", Value::from(vec![1, 2, 3]))]);
        assert_eq!(get(&v, &path!["a", 1]).unwrap(), Value::Int(2));
        assert_eq!(get(&v, &path!["a", -1]).unwrap(), Value::Int(3));
        assert_eq!(
            get(&v, &path!["b"]),
            Err(PathError::KeyNotFound("b".into()))
        );
        assert!(get(&v, &path!["a", 3]).unwrap_err().is_out_of_range());
    }

    #[test]
    fn list_of_lists_accepts_index_pairs_and_tuples() {
        let v = Value::from(vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(get(&v, &path![1, 0]).unwrap(), Value::Int(3));
        assert_eq!(get(&v, &path![[1, 0]]).unwrap(), Value::Int(3));
        let updated = set(&v, &path![[0, 1]], Value::Int(9)).unwrap();
        assert_eq!(updated, Value::from(vec![vec![1, 9], vec![3, 4]]));
    }

    #[test]
    fn set_copies_and_keeps_container_kind() {
        let v = Value::tuple([1, 2, 3]);
        let updated = set(&v, &path![Slice::new(Some(1), None, None)], Value::from(vec![8, 9]))
            .unwrap();
        assert_eq!(updated, Value::tuple([1, 8, 9]));
        assert_eq!(v, Value::tuple([1, 2, 3]));
    }

    #[test]
    fn array_paths() {
        let v = Value::array(&[2, 2], vec![1i64, 2, 3, 4]).unwrap();
        assert_eq!(get(&v, &path![[1, 1]]).unwrap(), Value::Int(4));
        let row = get(&v, &path![0]).unwrap();
        assert_eq!(row, Value::array(&[2], vec![1i64, 2]).unwrap());
        let updated = set(&v, &path![1], Value::Int(0)).unwrap();
        assert_eq!(updated, Value::array(&[2, 2], vec![1i64, 2, 0, 0]).unwrap());
        let mask = NdArray::from_shape_vec(vec![2, 2], vec![true, false, false, true]).unwrap();
        let diagonal = get(&v, &path![mask]).unwrap();
        assert_eq!(diagonal, Value::array(&[2], vec![1i64, 4]).unwrap());
    }

    #[test]
    fn split_stops_at_extracted_element() {
        let v = Value::array(&[3], vec![1i64, 2, 3]).unwrap();
        let s = split(&v, &path![1]).unwrap();
        assert_eq!(s.inside, path![1]);
        assert!(s.remaining.is_root());
        assert_eq!(s.value, Value::Int(2));

        let nested = Value::list([Value::map([("x", 1)])]);
        let s = split(&nested, &path![0, "x"]).unwrap();
        assert_eq!(s.inside, path![0, "x"]);
    }

    #[test]
    fn normalize_merges_and_swaps() {
        let v = Value::array(&[2, 2], vec![1i64, 2, 3, 4]).unwrap();
        assert_eq!(normalize(&v, &path![1, 0]), path![[1, 0]]);
        let s = Slice::full();
        assert_eq!(normalize(&v, &path![s, 0]), path![s, 0]);

        let record = Value::Record(
            crate::value::Record::new([(
                "x",
                NdArray::from_vec(vec![Scalar::Int(1), Scalar::Int(2)]),
            )])
            .unwrap(),
        );
        assert_eq!(normalize(&record, &path![1, "x"]), path!["x", 1]);
        assert_eq!(get(&record, &path!["x", 1]).unwrap(), Value::Int(2));
        assert_eq!(get(&record, &path![1, "x"]).unwrap(), Value::Int(2));
    }
}
