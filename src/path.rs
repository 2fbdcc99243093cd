//! Locations inside nested values.

use smallvec::SmallVec;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::array::{AxisIndex, NdArray, Slice};
use crate::value::{ContainerKind, Scalar, Value};

mod access;

pub use access::{get, normalize, set, split, Split};
pub(crate) use access::selection;

#[derive(Clone, PartialEq)]
pub enum Component {
    /// A single position along the leading axis. Negative counts from the end.
    Index(isize),
    Slice(Slice),
    /// An n-dimensional reference, one entry per leading axis.
    Tuple(Vec<AxisIndex>),
    /// Boolean selection over the leading axes.
    Mask(NdArray<bool>),
    /// A map key or a field name.
    Key(Rc<str>),
    Everything,
    /// Nothing assignable here: the path continues inside an element extracted from an array.
    OutOfArray,
}

impl Component {
    pub fn is_key(&self) -> bool {
        matches!(self, Component::Key(_))
    }

    /// Components that address positions of an n-dimensional structure.
    pub fn is_tensor(&self) -> bool {
        matches!(
            self,
            Component::Index(_)
                | Component::Slice(_)
                | Component::Tuple(_)
                | Component::Mask(_)
                | Component::Everything
        )
    }

    /// The component a runtime index value stands for, as in `container[item]`.
    pub fn from_value(item: &Value) -> Option<Component> {
        match item {
            Value::None => Some(Component::Everything),
            Value::Str(key) => Some(Component::Key(key.clone())),
            Value::Bool(_) => None,
            Value::Int(i) => Some(Component::Index(*i as isize)),
            Value::List(items) | Value::Tuple(items)
                if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Bool(_))) =>
            {
                item.to_array().ok().map(|a| Component::Mask(a.map(|s| s.truthy())))
            }
            Value::Tuple(items) => items
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(AxisIndex::Index(*i as isize)),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Component::Tuple),
            Value::Array(a) if a.iter().all(|s| matches!(s, Scalar::Bool(_))) => {
                Some(Component::Mask(a.map(|s| s.truthy())))
            }
            _ => None,
        }
    }

    pub(crate) fn as_axis_indices(&self) -> Option<SmallVec<[AxisIndex; 4]>> {
        match self {
            Component::Index(i) => Some(smallvec::smallvec![AxisIndex::Index(*i)]),
            Component::Slice(s) => Some(smallvec::smallvec![AxisIndex::Slice(*s)]),
            Component::Tuple(items) => Some(items.iter().copied().collect()),
            _ => None,
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Index(i) => write!(f, "{i}"),
            Component::Slice(s) => write!(f, "{s}"),
            Component::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Component::Mask(m) => write!(f, "mask{:?}", m.shape()),
            Component::Key(k) => write!(f, "{k:?}"),
            Component::Everything => write!(f, "..."),
            Component::OutOfArray => write!(f, "<out of array>"),
        }
    }
}

/// One step of a path, and the kind of container it was taken into, when known.
#[derive(Clone)]
pub struct PathComponent {
    pub component: Component,
    pub indexed_kind: Option<ContainerKind>,
}

impl PathComponent {
    pub fn new(component: Component) -> Self {
        Self {
            component,
            indexed_kind: None,
        }
    }

    pub fn with_kind(component: Component, kind: ContainerKind) -> Self {
        Self {
            component,
            indexed_kind: Some(kind),
        }
    }

    pub fn index(i: isize) -> Self {
        Self::new(Component::Index(i))
    }

    pub fn key(key: impl Into<Rc<str>>) -> Self {
        Self::new(Component::Key(key.into()))
    }

    pub fn indices(items: impl IntoIterator<Item = isize>) -> Self {
        Self::new(Component::Tuple(
            items.into_iter().map(AxisIndex::Index).collect(),
        ))
    }

    pub fn mask(mask: NdArray<bool>) -> Self {
        Self::new(Component::Mask(mask))
    }
}

impl Deref for PathComponent {
    type Target = Component;
    fn deref(&self) -> &Component {
        &self.component
    }
}

/// Two components are the same location whatever kind they were recorded with.
impl PartialEq for PathComponent {
    fn eq(&self, other: &Self) -> bool {
        self.component == other.component
    }
}

impl fmt::Debug for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.component, f)
    }
}

impl From<Component> for PathComponent {
    fn from(value: Component) -> Self {
        PathComponent::new(value)
    }
}

impl From<isize> for PathComponent {
    fn from(value: isize) -> Self {
        PathComponent::index(value)
    }
}

impl From<i32> for PathComponent {
    fn from(value: i32) -> Self {
        PathComponent::index(value as isize)
    }
}

impl From<usize> for PathComponent {
    fn from(value: usize) -> Self {
        PathComponent::index(value as isize)
    }
}

impl From<&str> for PathComponent {
    fn from(value: &str) -> Self {
        PathComponent::key(value)
    }
}

impl From<Slice> for PathComponent {
    fn from(value: Slice) -> Self {
        PathComponent::new(Component::Slice(value))
    }
}

impl From<NdArray<bool>> for PathComponent {
    fn from(value: NdArray<bool>) -> Self {
        PathComponent::mask(value)
    }
}

impl<const N: usize> From<[isize; N]> for PathComponent {
    fn from(value: [isize; N]) -> Self {
        PathComponent::indices(value)
    }
}

/// An ordered sequence of components, outermost first. The empty path is the whole value.
#[derive(Clone, PartialEq, Default)]
pub struct Path(SmallVec<[PathComponent; 2]>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, component: impl Into<PathComponent>) {
        self.0.push(component.into());
    }

    pub fn insert(&mut self, index: usize, component: impl Into<PathComponent>) {
        self.0.insert(index, component.into());
    }

    pub fn pop_front(&mut self) -> Option<PathComponent> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.remove(0))
        }
    }

    /// The concatenation of two paths.
    pub fn join(&self, other: &[PathComponent]) -> Self {
        self.iter().chain(other.iter()).cloned().collect()
    }

    pub fn truncated(&self, len: usize) -> Self {
        self.iter().take(len).cloned().collect()
    }

    pub fn tail(&self, from: usize) -> Self {
        self.iter().skip(from).cloned().collect()
    }
}

impl Deref for Path {
    type Target = [PathComponent];
    fn deref(&self) -> &[PathComponent] {
        &self.0
    }
}

impl FromIterator<PathComponent> for Path {
    fn from_iter<I: IntoIterator<Item = PathComponent>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl From<Vec<PathComponent>> for Path {
    fn from(value: Vec<PathComponent>) -> Self {
        Path(value.into())
    }
}

impl From<&[PathComponent]> for Path {
    fn from(value: &[PathComponent]) -> Self {
        Path(value.into())
    }
}

impl IntoIterator for Path {
    type Item = PathComponent;
    type IntoIter = smallvec::IntoIter<[PathComponent; 2]>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a PathComponent;
    type IntoIter = std::slice::Iter<'a, PathComponent>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c.component)?;
        }
        write!(f, "]")
    }
}

/// Build a [`Path`] from anything that converts into a [`PathComponent`].
///
/// ```
/// # use quiver::path;
/// let p = path![0, "x", [1, 2]];
/// assert_eq!(p.len(), 3);
/// assert!(path![].is_root());
/// ```
#[macro_export]
macro_rules! path {
    () => { $crate::Path::root() };
    ($($component:expr),+ $(,)?) => {{
        let mut path = $crate::Path::root();
        $( path.push($crate::PathComponent::from($component)); )+
        path
    }};
}
