use im_rc::{OrdMap, Vector};
use smallvec::smallvec;
use std::fmt;
use std::rc::Rc;

use crate::array::{NdArray, Selection, Shape};
use crate::error::{PathError, ShapeError};

/// A single numeric element of an array.
#[derive(Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x:?}"),
        }
    }
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Bool(b) => b as i64 as f64,
            Scalar::Int(i) => i as f64,
            Scalar::Float(x) => x,
        }
    }

    /// Integer view of an integral scalar. Floats with a fractional part have none.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Scalar::Bool(b) => Some(b as i64),
            Scalar::Int(i) => Some(i),
            Scalar::Float(x) if x.fract() == 0.0 && x.is_finite() => Some(x as i64),
            Scalar::Float(_) => None,
        }
    }

    pub fn truthy(self) -> bool {
        match self {
            Scalar::Bool(b) => b,
            Scalar::Int(i) => i != 0,
            Scalar::Float(x) => x != 0.0,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Scalar::Float(_))
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value as i64)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

/// A fielded tensor: every field is an array of the record's shape.
#[derive(Clone, PartialEq)]
pub struct Record {
    shape: Shape,
    fields: Vec<(Rc<str>, NdArray<Scalar>)>,
}

impl Record {
    pub fn new<K: Into<Rc<str>>>(
        fields: impl IntoIterator<Item = (K, NdArray<Scalar>)>,
    ) -> Result<Self, ShapeError> {
        let fields: Vec<(Rc<str>, NdArray<Scalar>)> =
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let shape: Shape = match fields.first() {
            Some((_, first)) => first.shape().into(),
            None => return Err(ShapeError::Other("a record needs at least one field".into())),
        };
        if fields.iter().any(|(_, f)| f.shape() != &shape[..]) {
            return Err(ShapeError::NotRectangular);
        }
        Ok(Self { shape, fields })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field_names(&self) -> impl Iterator<Item = &Rc<str>> {
        self.fields.iter().map(|(k, _)| k)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(k, _)| &**k == name)
    }

    pub fn field(&self, name: &str) -> Option<&NdArray<Scalar>> {
        self.fields.iter().find(|(k, _)| &**k == name).map(|(_, v)| v)
    }

    pub(crate) fn field_mut(&mut self, name: &str) -> Option<&mut NdArray<Scalar>> {
        self.fields
            .iter_mut()
            .find(|(k, _)| &**k == name)
            .map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(Rc<str>, NdArray<Scalar>)] {
        &self.fields
    }

    /// The same selection taken from every field.
    pub fn take(&self, selection: &Selection) -> Self {
        Self {
            shape: selection.shape.clone(),
            fields: self
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.take(selection)))
                .collect(),
        }
    }

    pub fn put(&mut self, selection: &Selection, values: &Record) -> Result<(), PathError> {
        for (name, field) in self.fields.iter_mut() {
            let incoming = values
                .field(name)
                .ok_or_else(|| PathError::KeyNotFound(name.clone()))?;
            field.put(selection, incoming)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

/// The coarse type of a value, as far as translators and caches care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    None,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Map,
    Array,
    Record,
}

impl ValueType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Bool | ValueType::Int | ValueType::Float)
    }

    pub fn is_sequence(self) -> bool {
        matches!(self, ValueType::List | ValueType::Tuple)
    }
}

/// What kind of container a path component indexes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Map,
    Sequence,
    Tensor,
    FieldTensor,
    Scalar,
}

#[derive(Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Vector<Value>),
    Tuple(Vector<Value>),
    Map(OrdMap<Rc<str>, Value>),
    Array(NdArray<Scalar>),
    Record(Record),
}

impl Value {
    pub fn list(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn tuple(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Value::Tuple(items.into_iter().map(Into::into).collect())
    }

    pub fn map<K: Into<Rc<str>>, V: Into<Value>>(items: impl IntoIterator<Item = (K, V)>) -> Self {
        Value::Map(
            items
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn array(shape: &[usize], data: Vec<impl Into<Scalar>>) -> Result<Self, ShapeError> {
        NdArray::from_shape_vec(shape, data.into_iter().map(Into::into).collect())
            .map(Value::Array)
    }

    pub fn ty(&self) -> ValueType {
        match self {
            Value::None => ValueType::None,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::List(_) => ValueType::List,
            Value::Tuple(_) => ValueType::Tuple,
            Value::Map(_) => ValueType::Map,
            Value::Array(_) => ValueType::Array,
            Value::Record(_) => ValueType::Record,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
        }
    }

    pub fn kind(&self) -> ContainerKind {
        match self {
            Value::Map(_) => ContainerKind::Map,
            Value::List(_) | Value::Tuple(_) => ContainerKind::Sequence,
            Value::Array(_) => ContainerKind::Tensor,
            Value::Record(_) => ContainerKind::FieldTensor,
            _ => ContainerKind::Scalar,
        }
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Int(i) => Some(Scalar::Int(*i)),
            Value::Float(x) => Some(Scalar::Float(*x)),
            Value::Array(a) if a.ndim() == 0 => Some(a.data()[0]),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(Scalar::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_scalar().map(Scalar::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NdArray<Scalar>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Vector<Value>> {
        match self {
            Value::List(v) | Value::Tuple(v) => Some(v),
            _ => None,
        }
    }

    /// The shape the value would have as an array. Ragged sequences only report their length.
    pub fn shape(&self) -> Shape {
        match self {
            Value::Array(a) => a.shape().into(),
            Value::Record(r) => r.shape().into(),
            Value::List(items) | Value::Tuple(items) => match self.to_array() {
                Ok(a) => a.shape().into(),
                Err(_) => smallvec![items.len()],
            },
            _ => Shape::new(),
        }
    }

    /// Convert scalars and rectangular nests of sequences into an array.
    pub fn to_array(&self) -> Result<NdArray<Scalar>, ShapeError> {
        match self {
            Value::Array(a) => Ok(a.clone()),
            Value::List(items) | Value::Tuple(items) => {
                let parts = items
                    .iter()
                    .map(Value::to_array)
                    .collect::<Result<Vec<_>, _>>()?;
                NdArray::stack(&parts)
            }
            other => other
                .as_scalar()
                .map(NdArray::scalar)
                .ok_or(ShapeError::NotNumeric(other.type_name())),
        }
    }

    /// The nested-list rendition of an array. 0-d arrays become plain scalars.
    pub fn from_array_as_list(array: &NdArray<Scalar>) -> Value {
        fn build(shape: &[usize], data: &[Scalar]) -> Value {
            match shape.split_first() {
                None => Value::from(data[0]),
                Some((&n, rest)) => {
                    let chunk: usize = rest.iter().product();
                    Value::List(
                        (0..n)
                            .map(|i| build(rest, &data[i * chunk..(i + 1) * chunk]))
                            .collect(),
                    )
                }
            }
        }
        build(array.shape(), array.data())
    }

    /// Rough memory footprint, used to decide whether caching pays off.
    pub fn approx_size_bytes(&self) -> usize {
        let word = std::mem::size_of::<usize>();
        match self {
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) => word,
            Value::Str(s) => s.len() + word,
            Value::List(items) | Value::Tuple(items) => {
                items.iter().map(Value::approx_size_bytes).sum::<usize>() + word
            }
            Value::Map(items) => {
                items
                    .iter()
                    .map(|(k, v)| k.len() + v.approx_size_bytes())
                    .sum::<usize>()
                    + word
            }
            Value::Array(a) => a.len() * std::mem::size_of::<Scalar>(),
            Value::Record(r) => r.len() * r.fields().len() * std::mem::size_of::<Scalar>(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Tuple(items) => {
                let mut t = f.debug_tuple("");
                for item in items {
                    t.field(item);
                }
                t.finish()
            }
            Value::Map(items) => f.debug_map().entries(items.iter()).finish(),
            Value::Array(a) => fmt::Debug::fmt(a, f),
            Value::Record(r) => write!(f, "record(shape={:?}, {:?})", r.shape(), r),
        }
    }
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(i) => Value::Int(i),
            Scalar::Float(x) => Value::Float(x),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::list(value)
    }
}

impl From<NdArray<Scalar>> for Value {
    fn from(value: NdArray<Scalar>) -> Self {
        Value::Array(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn nested_lists_convert_to_arrays() {
        let v = Value::from(vec![vec![1, 2, 3], vec![4, 5, 6]]);
        let a = v.to_array().unwrap();
        assert_eq!(a.shape(), &[2, 3]);
        assert_eq!(&v.shape()[..], &[2, 3]);
        assert_eq!(Value::from_array_as_list(&a), v);
    }

    #[test]
    fn ragged_lists_report_their_length() {
        let v = Value::list([Value::from(vec![1]), Value::from(vec![1, 2])]);
        assert_eq!(&v.shape()[..], &[2]);
        assert_eq!(v.to_array(), Err(ShapeError::NotRectangular));
    }

    #[test]
    fn arrays_never_equal_lists() {
        let list = Value::from(vec![1, 2]);
        let array = Value::Array(list.to_array().unwrap());
        assert_ne!(list, array);
        assert_eq!(array.kind(), ContainerKind::Tensor);
        assert_eq!(list.kind(), ContainerKind::Sequence);
    }

    #[test]
    fn record_fields_share_a_shape() {
        let r = Record::new([
            ("x", NdArray::from_vec(vec![Scalar::Int(1), Scalar::Int(2)])),
            ("y", NdArray::from_vec(vec![Scalar::Float(0.5), Scalar::Float(1.5)])),
        ])
        .unwrap();
        assert_eq!(r.shape(), &[2]);
        assert!(r.has_field("y"));
        let bad = Record::new([
            ("x", NdArray::from_vec(vec![Scalar::Int(1)])),
            ("y", NdArray::from_vec(vec![Scalar::Int(1), Scalar::Int(2)])),
        ]);
        assert!(bad.is_err());
    }
}
