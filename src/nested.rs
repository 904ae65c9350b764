//! Nested fields: recursion into another mapper.
//!
//! Resolution order when marshaling a nested value:
//!
//! 1. `__self__` source: the nested mapper writes straight into the parent's object.
//! 2. A configured getter is asked for an existing object. A miss is only
//!    acceptable when `allow_create` is set.
//! 3. Without a getter, `allow_updates_in_place` / `allow_partial_updates` take
//!    the object already stored at `source` (or the index-aligned collection
//!    element) as the target.
//! 4. An existing target is updated when any update flag is set; otherwise it
//!    is returned untouched and the input's other keys are ignored.
//! 5. No target: create a fresh object if `allow_create`, else `not_found`.

use crate::error::{InvalidKind, MapperError, Result};
use crate::field::Field;
use crate::mapper::Mapper;
use crate::registry;
use crate::role::DEFAULT_ROLE;
use crate::schema::MapperSchema;
use crate::session::{Output, Session};
use crate::value::{Obj, Value};
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

/// Looks up an existing internal object for the nested input in `session.data`.
pub type Getter = Arc<dyn Fn(&Session<'_>) -> Option<Obj> + Send + Sync>;

/// The mapper a nested field recurses into.
#[derive(Clone)]
pub enum MapperRef {
    Schema(Arc<MapperSchema>),
    /// Resolved through the registry each time it is used.
    Named(String),
}

impl MapperRef {
    pub fn resolve(&self) -> Result<Arc<MapperSchema>> {
        match self {
            MapperRef::Schema(schema) => Ok(Arc::clone(schema)),
            MapperRef::Named(name) => registry::lookup(name),
        }
    }
}

impl fmt::Debug for MapperRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapperRef::Schema(schema) => f.debug_tuple("Schema").field(&schema.name()).finish(),
            MapperRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

#[derive(Clone)]
pub struct NestedOpts {
    pub(crate) target: MapperRef,
    pub(crate) role: String,
    pub(crate) getter: Option<Getter>,
    pub(crate) allow_create: bool,
    pub(crate) allow_updates: bool,
    pub(crate) allow_updates_in_place: bool,
    pub(crate) allow_partial_updates: bool,
}

impl NestedOpts {
    pub fn new(target: impl Into<MapperRef>) -> Self {
        NestedOpts {
            target: target.into(),
            role: DEFAULT_ROLE.to_string(),
            getter: None,
            allow_create: false,
            allow_updates: false,
            allow_updates_in_place: false,
            allow_partial_updates: false,
        }
    }

    /// Role applied to the nested mapper.
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Session<'_>) -> Option<Obj> + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(f));
        self
    }

    pub fn allow_create(mut self) -> Self {
        self.allow_create = true;
        self
    }

    pub fn allow_updates(mut self) -> Self {
        self.allow_updates = true;
        self
    }

    /// Update the object already stored at `source`, or the index-aligned
    /// element inside a collection. Such a collection does not grow: extra
    /// input elements fail with `too_many`, unless `allow_create` is also set,
    /// in which case they are created and appended.
    pub fn allow_updates_in_place(mut self) -> Self {
        self.allow_updates_in_place = true;
        self
    }

    /// Run the nested mapper with `partial` forced on and update the existing object.
    pub fn allow_partial_updates(mut self) -> Self {
        self.allow_partial_updates = true;
        self
    }

    pub fn target(&self) -> &MapperRef {
        &self.target
    }

    pub fn get_role(&self) -> &str {
        &self.role
    }

    fn updates_existing(&self) -> bool {
        self.allow_updates || self.allow_updates_in_place || self.allow_partial_updates
    }

    /// Whether index-aligned or stored objects are used as update targets.
    pub(crate) fn uses_existing(&self) -> bool {
        self.getter.is_none() && (self.allow_updates_in_place || self.allow_partial_updates)
    }
}

impl fmt::Debug for NestedOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedOpts")
            .field("target", &self.target)
            .field("role", &self.role)
            .field("getter", &self.getter.is_some())
            .field("allow_create", &self.allow_create)
            .field("allow_updates", &self.allow_updates)
            .field("allow_updates_in_place", &self.allow_updates_in_place)
            .field("allow_partial_updates", &self.allow_partial_updates)
            .finish()
    }
}

impl From<&str> for MapperRef {
    fn from(name: &str) -> Self {
        MapperRef::Named(name.to_string())
    }
}

impl From<String> for MapperRef {
    fn from(name: String) -> Self {
        MapperRef::Named(name)
    }
}

impl From<Arc<MapperSchema>> for MapperRef {
    fn from(schema: Arc<MapperSchema>) -> Self {
        MapperRef::Schema(schema)
    }
}

impl From<&Arc<MapperSchema>> for MapperRef {
    fn from(schema: &Arc<MapperSchema>) -> Self {
        MapperRef::Schema(Arc::clone(schema))
    }
}

impl From<&str> for NestedOpts {
    fn from(name: &str) -> Self {
        NestedOpts::new(name)
    }
}

impl From<String> for NestedOpts {
    fn from(name: String) -> Self {
        NestedOpts::new(name)
    }
}

impl From<Arc<MapperSchema>> for NestedOpts {
    fn from(schema: Arc<MapperSchema>) -> Self {
        NestedOpts::new(schema)
    }
}

impl From<&Arc<MapperSchema>> for NestedOpts {
    fn from(schema: &Arc<MapperSchema>) -> Self {
        NestedOpts::new(schema)
    }
}

fn check_depth(session: &Session<'_>) -> Result<()> {
    let max = session.mapper.get_limits().max_depth;
    if session.depth() >= max {
        return Err(MapperError::DepthExceeded(max));
    }
    Ok(())
}

/// Resolve and marshal one nested input object.
///
/// `existing` is the value currently stored for this field: the attribute at
/// `source`, or the index-aligned element when called from a collection.
pub(crate) fn marshal_nested(
    field: &Field,
    opts: &NestedOpts,
    session: &Session<'_>,
    datum: &Json,
    existing: Option<Value>,
) -> Result<Value> {
    let schema = opts.target.resolve()?;
    check_depth(session)?;
    let mut child = Mapper::new(&schema)
        .data(datum)
        .partial(session.partial || opts.allow_partial_updates)
        .limits(session.mapper.get_limits());

    if field.is_self_source() {
        let target = session
            .output
            .as_object()
            .cloned()
            .ok_or_else(|| MapperError::MissingObject(schema.name().to_string()))?;
        tracing::trace!(field = field.get_name(), mapper = schema.name(), "nested into parent object");
        if let Some(obj) = session.obj.as_ref().and_then(Value::as_object) {
            child = child.obj(obj.clone());
        }
        child.marshal_into(&opts.role, target.clone(), Some(session))?;
        session.changes.borrow_mut().merge(child.take_changes());
        return Ok(Value::Object(target));
    }

    let existing = match existing {
        Some(Value::Object(o)) => Some(o),
        _ => None,
    };

    let target = if let Some(getter) = &opts.getter {
        let found = {
            let lookup = Session::new(
                &child,
                Some(datum),
                existing.map(Value::Object),
                Output::Empty,
                Some(session),
            );
            getter(&lookup)
        };
        match found {
            Some(obj) => Some(obj),
            None if opts.allow_create => None,
            None => {
                tracing::trace!(field = field.get_name(), "getter found nothing");
                return Err(field.invalid(InvalidKind::NotFound).into());
            }
        }
    } else if opts.uses_existing() {
        existing
    } else {
        None
    };

    match target {
        Some(obj) if opts.updates_existing() => {
            tracing::trace!(field = field.get_name(), mapper = schema.name(), "updating existing object");
            let mut child = child.obj(obj.clone());
            child.marshal_into(&opts.role, obj.clone(), Some(session))?;
            Ok(Value::Object(obj))
        }
        Some(obj) => {
            tracing::trace!(field = field.get_name(), "existing object kept unchanged");
            Ok(Value::Object(obj))
        }
        None if opts.allow_create => {
            let obj = schema.object_type()?.instantiate();
            tracing::trace!(field = field.get_name(), mapper = schema.name(), "creating object");
            child.marshal_into(&opts.role, obj.clone(), Some(session))?;
            Ok(Value::Object(obj))
        }
        None => Err(field.invalid(InvalidKind::NotFound).into()),
    }
}

/// Serialize one nested internal object.
pub(crate) fn serialize_nested(
    field: &Field,
    opts: &NestedOpts,
    session: &Session<'_>,
    value: Value,
) -> Result<Json> {
    let schema = opts.target.resolve()?;
    check_depth(session)?;
    let obj = match value {
        Value::Object(o) => o,
        _ => return Err(field.invalid(InvalidKind::TypeError).into()),
    };
    let child = Mapper::new(&schema).obj(obj).limits(session.mapper.get_limits());
    child.serialize_in(&opts.role, Some(session))
}
