//! Runtime values of the debugged program and their inspection.

pub mod expression;
pub mod path;
pub mod render;
pub mod resolver;

use indexmap::IndexMap;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, RwLock, RwLockReadGuard};

/// Shared mutable container, two values may point to the same container
/// (and a container may contain itself).
pub type Shared<T> = Arc<RwLock<T>>;

/// Runtime type of a value: optional namespace (module) and a name.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TypeIdentity {
    namespace: Option<Cow<'static, str>>,
    name: Cow<'static, str>,
}

impl TypeIdentity {
    /// Identity of a built-in type.
    pub const fn builtin(name: &'static str) -> Self {
        Self {
            namespace: None,
            name: Cow::Borrowed(name),
        }
    }

    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(Cow::Owned(namespace.into())),
            name: Cow::Owned(name.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl Display for TypeIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            None => f.write_str(&self.name),
            Some(ns) => write!(f, "{ns}.{}", self.name),
        }
    }
}

pub const NONE_TYPE: TypeIdentity = TypeIdentity::builtin("NoneType");
pub const BOOL_TYPE: TypeIdentity = TypeIdentity::builtin("bool");
pub const INT_TYPE: TypeIdentity = TypeIdentity::builtin("int");
pub const FLOAT_TYPE: TypeIdentity = TypeIdentity::builtin("float");
pub const STR_TYPE: TypeIdentity = TypeIdentity::builtin("str");
pub const BYTES_TYPE: TypeIdentity = TypeIdentity::builtin("bytes");
pub const LIST_TYPE: TypeIdentity = TypeIdentity::builtin("list");
pub const TUPLE_TYPE: TypeIdentity = TypeIdentity::builtin("tuple");
pub const DICT_TYPE: TypeIdentity = TypeIdentity::builtin("dict");
pub const SET_TYPE: TypeIdentity = TypeIdentity::builtin("set");

/// Instance of a user-defined type.
pub struct Object {
    pub type_identity: TypeIdentity,
    pub attributes: RwLock<IndexMap<String, Value>>,
}

impl Object {
    pub fn attributes(&self) -> RwLockReadGuard<'_, IndexMap<String, Value>> {
        self.attributes.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attributes().get(name).cloned()
    }

    pub fn set_attr(&self, name: &str, value: Value) {
        let mut attrs = self.attributes.write().unwrap_or_else(|e| e.into_inner());
        attrs.insert(name.to_string(), value);
    }
}

/// Value the host runtime can't describe structurally, carries a ready repr.
#[derive(Clone, Debug)]
pub struct Opaque {
    pub type_identity: TypeIdentity,
    pub repr: String,
}

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    List(Shared<Vec<Value>>),
    Tuple(Arc<[Value]>),
    Dict(Shared<Vec<(Value, Value)>>),
    Set(Shared<Vec<Value>>),
    Object(Arc<Object>),
    Opaque(Arc<Opaque>),
}

/// Read lock that survives a poisoned container, values are only inspected.
pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

impl Value {
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Self {
        Value::Bytes(b.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(items.into())
    }

    pub fn dict(entries: Vec<(Value, Value)>) -> Self {
        Value::Dict(Arc::new(RwLock::new(entries)))
    }

    pub fn set(items: Vec<Value>) -> Self {
        Value::Set(Arc::new(RwLock::new(items)))
    }

    pub fn object(
        type_identity: TypeIdentity,
        attributes: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        Value::Object(Arc::new(Object {
            type_identity,
            attributes: RwLock::new(attributes.into_iter().collect()),
        }))
    }

    pub fn opaque(type_identity: TypeIdentity, repr: impl Into<String>) -> Self {
        Value::Opaque(Arc::new(Opaque {
            type_identity,
            repr: repr.into(),
        }))
    }

    pub fn type_identity(&self) -> TypeIdentity {
        match self {
            Value::None => NONE_TYPE,
            Value::Bool(_) => BOOL_TYPE,
            Value::Int(_) => INT_TYPE,
            Value::Float(_) => FLOAT_TYPE,
            Value::Str(_) => STR_TYPE,
            Value::Bytes(_) => BYTES_TYPE,
            Value::List(_) => LIST_TYPE,
            Value::Tuple(_) => TUPLE_TYPE,
            Value::Dict(_) => DICT_TYPE,
            Value::Set(_) => SET_TYPE,
            Value::Object(obj) => obj.type_identity.clone(),
            Value::Opaque(op) => op.type_identity.clone(),
        }
    }

    /// Number of elements for containers and strings.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::Bytes(b) => Some(b.len()),
            Value::List(items) | Value::Set(items) => Some(read(items).len()),
            Value::Tuple(items) => Some(items.len()),
            Value::Dict(entries) => Some(read(entries).len()),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Object(_) | Value::Opaque(_) => true,
            _ => self.len().unwrap_or(0) != 0,
        }
    }

    /// Value equality: structural for scalars and containers, identity for objects.
    pub fn equals(&self, other: &Value) -> bool {
        self.equals_bounded(other, 0)
    }

    fn equals_bounded(&self, other: &Value, depth: usize) -> bool {
        const MAX_DEPTH: usize = 64;
        if depth > MAX_DEPTH {
            return false;
        }
        let eq_seq = |a: &[Value], b: &[Value]| {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| x.equals_bounded(y, depth + 1))
        };
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Bool(a), Value::Int(b)) | (Value::Int(b), Value::Bool(a)) => *a as i64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Arc::ptr_eq(a, b) || eq_seq(&read(a), &read(b))
            }
            (Value::Tuple(a), Value::Tuple(b)) => eq_seq(a, b),
            (Value::Set(a), Value::Set(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (read(a), read(b));
                a.len() == b.len()
                    && a.iter()
                        .all(|x| b.iter().any(|y| x.equals_bounded(y, depth + 1)))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (read(a), read(b));
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(k2, v2)| {
                            k.equals_bounded(k2, depth + 1) && v.equals_bounded(v2, depth + 1)
                        })
                    })
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Address of a shared container, used for cycle detection.
    pub(crate) fn container_addr(&self) -> Option<*const ()> {
        match self {
            Value::List(c) | Value::Set(c) => Some(Arc::as_ptr(c) as *const ()),
            Value::Dict(c) => Some(Arc::as_ptr(c) as *const ()),
            Value::Tuple(c) => Some(Arc::as_ptr(c) as *const Value as *const ()),
            Value::Object(c) => Some(Arc::as_ptr(c) as *const ()),
            _ => None,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&render::repr(self, &render::ReprOptions::default()))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::str(s)
    }
}
