//! Resolvers expand a value into named children and describe how it renders.

use crate::debugger::error::Error;
use crate::debugger::variable::render::{self, BoundedWriter, ReprOptions};
use crate::debugger::variable::{read, TypeIdentity, Value};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, RwLock};

/// Name of the pseudo child holding container length.
pub const LEN_CHILD: &str = "__len__";

/// Max length of a dictionary key repr used as a child name.
const KEY_NAME_LEN: usize = 256;

pub trait Resolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether values handled by this resolver can be expanded.
    fn is_container(&self) -> bool {
        true
    }

    /// Ordered children of a value.
    fn children(&self, value: &Value) -> Result<Vec<(String, Value)>, Error>;

    /// Single child by name.
    fn resolve(&self, value: &Value, child: &str) -> Result<Value, Error> {
        self.children(value)?
            .into_iter()
            .find_map(|(name, v)| (name == child).then_some(v))
            .ok_or_else(|| Error::AttributeNotFound {
                type_name: value.type_identity().to_string(),
                attr: child.to_string(),
            })
    }

    /// Value repr, bounded by `opts`.
    fn repr(&self, value: &Value, opts: &ReprOptions) -> Result<String, Error> {
        Ok(render::repr(value, opts))
    }
}

/// Predicate deciding whether a resolver handles a value.
///
/// Decisions are cached per [`TypeIdentity`], so a predicate must depend only
/// on the value type.
pub type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Ordered list of resolvers with a per-type lookup cache.
pub struct ResolverRegistry {
    resolvers: Vec<(Predicate, Arc<dyn Resolver>)>,
    default: Arc<dyn Resolver>,
    cache: RwLock<HashMap<TypeIdentity, Option<usize>>>,
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ResolverRegistry {
    /// Registry with sequence, map, set and object resolvers, scalars use the default one.
    pub fn with_builtins() -> Self {
        let resolvers: Vec<(Predicate, Arc<dyn Resolver>)> = vec![
            (
                Box::new(|v| matches!(v, Value::List(_) | Value::Tuple(_))),
                Arc::new(SequenceResolver),
            ),
            (Box::new(|v| matches!(v, Value::Dict(_))), Arc::new(MapResolver)),
            (Box::new(|v| matches!(v, Value::Set(_))), Arc::new(SetResolver)),
            (Box::new(|v| matches!(v, Value::Object(_))), Arc::new(ObjectResolver)),
        ];
        Self {
            resolvers,
            default: Arc::new(ScalarResolver),
            cache: RwLock::default(),
        }
    }

    /// Register a resolver that takes precedence over all registered before.
    pub fn register(&mut self, predicate: Predicate, resolver: Arc<dyn Resolver>) {
        self.resolvers.insert(0, (predicate, resolver));
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Find a resolver for a value, first matching predicate wins.
    pub fn lookup(&self, value: &Value) -> Arc<dyn Resolver> {
        let type_identity = value.type_identity();
        if let Some(cached) = read(&self.cache).get(&type_identity).copied() {
            return self.by_index(cached);
        }

        let idx = self
            .resolvers
            .iter()
            .position(|(predicate, _)| predicate(value));
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(type_identity, idx);
        self.by_index(idx)
    }

    fn by_index(&self, idx: Option<usize>) -> Arc<dyn Resolver> {
        match idx {
            Some(idx) => self.resolvers[idx].1.clone(),
            None => self.default.clone(),
        }
    }

    /// Render value as `TypeLabel: repr`, capped at `max_len` chars plus `...`.
    ///
    /// If the resolver fails the result is `Unable to get repr for <type>`.
    pub fn display(&self, value: &Value, max_len: usize) -> String {
        let type_identity = value.type_identity();
        let resolver = self.lookup(value);
        let opts = ReprOptions {
            max_len,
            ..ReprOptions::default()
        };
        let repr = match resolver.repr(value, &opts) {
            Ok(repr) => repr,
            Err(e) => {
                log::debug!(target: "debugger", "resolver `{}`: {e:#}", resolver.name());
                return format!("Unable to get repr for {type_identity}");
            }
        };

        let mut w = BoundedWriter::new(max_len);
        _ = write!(w, "{}: {repr}", type_identity.name());
        w.finish()
    }
}

fn index_child(value: &Value, child: &str, items: &[Value]) -> Result<Value, Error> {
    if child == LEN_CHILD {
        return Ok(Value::Int(items.len() as i64));
    }
    child
        .parse::<usize>()
        .ok()
        .and_then(|idx| items.get(idx).cloned())
        .ok_or_else(|| Error::AttributeNotFound {
            type_name: value.type_identity().to_string(),
            attr: child.to_string(),
        })
}

fn indexed_children(items: &[Value]) -> Vec<(String, Value)> {
    let mut children: Vec<_> = items
        .iter()
        .enumerate()
        .map(|(i, v)| (i.to_string(), v.clone()))
        .collect();
    children.push((LEN_CHILD.to_string(), Value::Int(items.len() as i64)));
    children
}

/// Lists and tuples: children `0..n` and `__len__`.
pub struct SequenceResolver;

impl Resolver for SequenceResolver {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn children(&self, value: &Value) -> Result<Vec<(String, Value)>, Error> {
        match value {
            Value::List(items) => Ok(indexed_children(&read(items))),
            Value::Tuple(items) => Ok(indexed_children(items)),
            _ => Err(Error::Resolver(self.name(), "not a sequence".to_string())),
        }
    }

    fn resolve(&self, value: &Value, child: &str) -> Result<Value, Error> {
        match value {
            Value::List(items) => index_child(value, child, &read(items)),
            Value::Tuple(items) => index_child(value, child, items),
            _ => Err(Error::Resolver(self.name(), "not a sequence".to_string())),
        }
    }
}

/// Sets: children named by iteration position and `__len__`.
pub struct SetResolver;

impl Resolver for SetResolver {
    fn name(&self) -> &'static str {
        "set"
    }

    fn children(&self, value: &Value) -> Result<Vec<(String, Value)>, Error> {
        match value {
            Value::Set(items) => Ok(indexed_children(&read(items))),
            _ => Err(Error::Resolver(self.name(), "not a set".to_string())),
        }
    }

    fn resolve(&self, value: &Value, child: &str) -> Result<Value, Error> {
        match value {
            Value::Set(items) => index_child(value, child, &read(items)),
            _ => Err(Error::Resolver(self.name(), "not a set".to_string())),
        }
    }
}

/// Dictionaries: children named by key repr and `__len__`.
pub struct MapResolver;

impl MapResolver {
    pub(crate) fn key_name(key: &Value) -> String {
        render::repr(
            key,
            &ReprOptions {
                max_len: KEY_NAME_LEN,
                ..ReprOptions::default()
            },
        )
    }
}

impl Resolver for MapResolver {
    fn name(&self) -> &'static str {
        "map"
    }

    fn children(&self, value: &Value) -> Result<Vec<(String, Value)>, Error> {
        let Value::Dict(entries) = value else {
            return Err(Error::Resolver(self.name(), "not a dict".to_string()));
        };
        let entries = read(entries);
        let mut children: Vec<_> = entries
            .iter()
            .map(|(k, v)| (Self::key_name(k), v.clone()))
            .collect();
        children.push((LEN_CHILD.to_string(), Value::Int(entries.len() as i64)));
        Ok(children)
    }
}

/// Instances of user types: attributes in definition order.
pub struct ObjectResolver;

impl Resolver for ObjectResolver {
    fn name(&self) -> &'static str {
        "object"
    }

    fn children(&self, value: &Value) -> Result<Vec<(String, Value)>, Error> {
        let Value::Object(obj) = value else {
            return Err(Error::Resolver(self.name(), "not an object".to_string()));
        };
        Ok(obj
            .attributes()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn resolve(&self, value: &Value, child: &str) -> Result<Value, Error> {
        let Value::Object(obj) = value else {
            return Err(Error::Resolver(self.name(), "not an object".to_string()));
        };
        obj.get_attr(child).ok_or_else(|| Error::AttributeNotFound {
            type_name: obj.type_identity.to_string(),
            attr: child.to_string(),
        })
    }
}

/// Fallback for values without children.
pub struct ScalarResolver;

impl Resolver for ScalarResolver {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn is_container(&self) -> bool {
        false
    }

    fn children(&self, _: &Value) -> Result<Vec<(String, Value)>, Error> {
        Ok(vec![])
    }

    fn resolve(&self, value: &Value, _: &str) -> Result<Value, Error> {
        Err(Error::NotAContainer(value.type_identity().to_string()))
    }
}
