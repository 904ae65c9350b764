//! Internal values produced by marshaling (object graph representation).

use serde_json::{Map, Number, Value as Json};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Type name given to objects built from plain JSON objects.
pub const DICT_TYPE: &str = "dict";

/// A single internal value (attribute or compound).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Object(Obj),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(x) => Some(*x as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Obj> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Copy the value, giving every reachable object a fresh handle.
    ///
    /// Used to snapshot attribute values before a marshal mutates them. Shared
    /// and cyclic references are preserved in the copy.
    pub fn deep_clone(&self) -> Value {
        self.clone_in(&mut HashMap::new())
    }

    fn clone_in(&self, copies: &mut HashMap<usize, Obj>) -> Value {
        match self {
            Value::List(items) => Value::List(items.iter().map(|v| v.clone_in(copies)).collect()),
            Value::Object(o) => Value::Object(o.clone_in(copies)),
            other => other.clone(),
        }
    }

    // Pairs already under comparison count as equal, so cycles terminate.
    fn eq_in(&self, other: &Value, seen: &mut HashSet<(usize, usize)>) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_in(y, seen))
            }
            (Value::Object(a), Value::Object(b)) => a.eq_in(b, seen),
            (a, b) => a == b,
        }
    }

    /// Convert plain JSON into an internal value. JSON objects become [`DICT_TYPE`] objects.
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => {
                let obj = Obj::new(DICT_TYPE);
                for (k, v) in map {
                    obj.set(k, Value::from_json(v));
                }
                Value::Object(obj)
            }
        }
    }

    /// Convert to plain JSON. Objects are rendered as their attribute maps;
    /// non-finite floats and back-references to an enclosing object become `null`.
    pub fn to_json(&self) -> Json {
        self.json_in(&mut HashSet::new())
    }

    fn json_in(&self, path: &mut HashSet<usize>) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(|v| v.json_in(path)).collect()),
            Value::Object(o) => o.json_in(path),
        }
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

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Obj> for Value {
    fn from(o: Obj) -> Self {
        Value::Object(o)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// The internal type a mapper instantiates when it has to create an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectType {
    name: String,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        ObjectType { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Construct an empty object of this type.
    pub fn instantiate(&self) -> Obj {
        Obj::new(self.name.clone())
    }
}

impl From<&str> for ObjectType {
    fn from(name: &str) -> Self {
        ObjectType::new(name)
    }
}

impl From<String> for ObjectType {
    fn from(name: String) -> Self {
        ObjectType::new(name)
    }
}

#[derive(Debug)]
struct Object {
    type_name: String,
    attrs: BTreeMap<String, Value>,
}

/// Shared handle to an internal object: a typed bag of attributes.
///
/// Cloning the handle does not copy the object; updates through any clone are
/// visible through all of them. Equality is structural (same type name and
/// equal attributes) and short-circuits on identity.
#[derive(Clone)]
pub struct Obj(Arc<RwLock<Object>>);

impl Obj {
    pub fn new(type_name: impl Into<String>) -> Self {
        Obj(Arc::new(RwLock::new(Object {
            type_name: type_name.into(),
            attrs: BTreeMap::new(),
        })))
    }

    /// Builder-style attribute assignment.
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Object> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Object> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn type_name(&self) -> String {
        self.read().type_name.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().attrs.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().attrs.contains_key(key)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.write().attrs.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().attrs.remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().attrs.keys().cloned().collect()
    }

    /// True when both handles point at the same object.
    pub fn ptr_eq(&self, other: &Obj) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    // Locks are never held while recursing into attribute values.
    fn snapshot(&self) -> (String, BTreeMap<String, Value>) {
        let inner = self.read();
        (inner.type_name.clone(), inner.attrs.clone())
    }

    /// Copy the object graph reachable from this handle. Objects reached more
    /// than once map to a single copy.
    pub fn deep_clone(&self) -> Obj {
        self.clone_in(&mut HashMap::new())
    }

    fn clone_in(&self, copies: &mut HashMap<usize, Obj>) -> Obj {
        if let Some(copy) = copies.get(&self.addr()) {
            return copy.clone();
        }
        let (type_name, attrs) = self.snapshot();
        let copy = Obj::new(type_name);
        copies.insert(self.addr(), copy.clone());
        for (k, v) in attrs {
            copy.set(k, v.clone_in(copies));
        }
        copy
    }

    fn eq_in(&self, other: &Obj, seen: &mut HashSet<(usize, usize)>) -> bool {
        if self.ptr_eq(other) || !seen.insert((self.addr(), other.addr())) {
            return true;
        }
        let ((ta, a), (tb, b)) = (self.snapshot(), other.snapshot());
        ta == tb
            && a.len() == b.len()
            && a.iter().zip(&b).all(|((ka, va), (kb, vb))| ka == kb && va.eq_in(vb, seen))
    }

    pub fn to_json(&self) -> Json {
        self.json_in(&mut HashSet::new())
    }

    fn json_in(&self, path: &mut HashSet<usize>) -> Json {
        if !path.insert(self.addr()) {
            return Json::Null;
        }
        let (_, attrs) = self.snapshot();
        let map: Map<String, Json> = attrs.iter().map(|(k, v)| (k.clone(), v.json_in(path))).collect();
        path.remove(&self.addr());
        Json::Object(map)
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        self.eq_in(other, &mut HashSet::new())
    }
}

thread_local! {
    // Objects currently being formatted on this thread.
    static DEBUG_PATH: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (type_name, attrs) = self.snapshot();
        let entered = DEBUG_PATH.with(|path| path.borrow_mut().insert(self.addr()));
        if !entered {
            return write!(f, "{type_name} {{ .. }}");
        }
        let mut s = f.debug_struct(&type_name);
        for (k, v) in &attrs {
            s.field(k, v);
        }
        let result = s.finish();
        DEBUG_PATH.with(|path| path.borrow_mut().remove(&self.addr()));
        result
    }
}
