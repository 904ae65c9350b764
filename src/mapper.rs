//! Mapper instances: one schema applied to one input or object.

use crate::changes::Changes;
use crate::error::{MapperError, Result};
use crate::pipeline::{MarshalPipeline, Pipeline, SerializePipeline};
use crate::registry;
use crate::role::DEFAULT_ROLE;
use crate::schema::MapperSchema;
use crate::session::{Output, Session};
use crate::value::{Obj, Value};
use serde_json::{Map, Value as Json};
use std::sync::Arc;

/// Bounds applied to a single marshal/serialize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of nested mapper levels below the root.
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits { max_depth: 64 }
    }
}

/// A schema bound to call inputs.
///
/// ```
/// use fieldmap::{Field, Mapper, MapperSchema};
/// use serde_json::json;
///
/// let schema = MapperSchema::builder("DocUserMapper")
///     .object_type("User")
///     .field("name", Field::string().required())
///     .build();
///
/// let data = json!({"name": "mike"});
/// let user = Mapper::new(&schema).data(&data).marshal().unwrap();
/// assert_eq!(user.get("name").and_then(|v| v.as_str().map(String::from)), Some("mike".into()));
///
/// let out = Mapper::new(&schema).obj(user).serialize().unwrap();
/// assert_eq!(out, data);
/// ```
#[derive(Debug)]
pub struct Mapper<'a> {
    schema: Arc<MapperSchema>,
    data: Option<&'a Json>,
    obj: Option<Obj>,
    partial: bool,
    limits: Limits,
    changes: Changes,
}

impl<'a> Mapper<'a> {
    pub fn new(schema: &Arc<MapperSchema>) -> Self {
        Mapper {
            schema: Arc::clone(schema),
            data: None,
            obj: None,
            partial: false,
            limits: Limits::default(),
            changes: Changes::default(),
        }
    }

    /// Look the schema up in the registry.
    pub fn named(name: &str) -> Result<Self> {
        Ok(Mapper::new(&registry::lookup(name)?))
    }

    /// External input for marshaling.
    pub fn data(mut self, data: &'a Json) -> Self {
        self.data = Some(data);
        self
    }

    /// Existing object: the update target when marshaling, the source when serializing.
    pub fn obj(mut self, obj: Obj) -> Self {
        self.obj = Some(obj);
        self
    }

    /// Only touch fields present in the input.
    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn get_limits(&self) -> Limits {
        self.limits
    }

    pub fn schema(&self) -> &Arc<MapperSchema> {
        &self.schema
    }

    /// Changes recorded by the last marshal call.
    pub fn get_changes(&self) -> &Changes {
        &self.changes
    }

    pub(crate) fn take_changes(&mut self) -> Changes {
        std::mem::take(&mut self.changes)
    }

    pub fn marshal(&mut self) -> Result<Obj> {
        self.marshal_role(DEFAULT_ROLE)
    }

    /// Marshal `data` into the existing object, or into a new one of the
    /// schema's object type.
    pub fn marshal_role(&mut self, role: &str) -> Result<Obj> {
        let target = match &self.obj {
            Some(obj) => obj.clone(),
            None => self.schema.object_type()?.instantiate(),
        };
        self.marshal_into(role, target, None)
    }

    pub(crate) fn marshal_into(
        &mut self,
        role: &str,
        target: Obj,
        parent: Option<&Session<'_>>,
    ) -> Result<Obj> {
        let schema = Arc::clone(&self.schema);
        let data = match self.data {
            Some(data) if data.is_object() => data,
            _ => return Err(MapperError::InvalidData(schema.name().to_string())),
        };
        let fields = schema.active_fields(role)?;

        let mut session = Session::new(
            &*self,
            Some(data),
            self.obj.clone().map(Value::Object),
            Output::Object(target.clone()),
            parent,
        );
        tracing::debug!(
            mapper = schema.name(),
            role,
            partial = session.partial,
            depth = session.depth(),
            "marshal"
        );

        for field in fields {
            let tracked = !field.is_self_source();
            let old = if tracked {
                target.get(field.get_source()).map(|v| v.deep_clone())
            } else {
                None
            };
            tracing::trace!(field = field.get_name(), "marshal field");
            let written = MarshalPipeline.run(field, &mut session).map_err(|err| {
                tracing::debug!(mapper = schema.name(), field = field.get_name(), error = %err, "marshal failed");
                err
            })?;
            if written && tracked {
                if let Some(new) = target.get(field.get_source()) {
                    session.changes.borrow_mut().record(field.get_name(), old, new);
                }
            }
        }

        for validator in schema.validators() {
            validator(&session, &target)?;
        }

        let changes = session.into_changes();
        self.changes = changes;
        Ok(target)
    }

    pub fn serialize(&self) -> Result<Json> {
        self.serialize_role(DEFAULT_ROLE)
    }

    pub fn serialize_role(&self, role: &str) -> Result<Json> {
        self.serialize_in(role, None)
    }

    pub(crate) fn serialize_in(&self, role: &str, parent: Option<&Session<'_>>) -> Result<Json> {
        let obj = self
            .obj
            .clone()
            .ok_or_else(|| MapperError::MissingObject(self.schema.name().to_string()))?;
        let fields = self.schema.active_fields(role)?;

        let mut session = Session::new(
            self,
            self.data,
            Some(Value::Object(obj)),
            Output::Map(Map::new()),
            parent,
        );
        tracing::debug!(
            mapper = self.schema.name(),
            role,
            depth = session.depth(),
            "serialize"
        );

        for field in fields {
            tracing::trace!(field = field.get_name(), "serialize field");
            SerializePipeline.run(field, &mut session).map_err(|err| {
                tracing::debug!(mapper = self.schema.name(), field = field.get_name(), error = %err, "serialize failed");
                err
            })?;
        }

        match session.output {
            Output::Map(map) => Ok(Json::Object(map)),
            _ => Ok(Json::Object(Map::new())),
        }
    }

    /// Marshal each input through `schema` into new objects. Stops at the first failure.
    pub fn marshal_many(schema: &Arc<MapperSchema>, items: &[Json]) -> Result<Vec<Obj>> {
        items
            .iter()
            .map(|item| Mapper::new(schema).data(item).marshal())
            .collect()
    }

    pub fn serialize_many(schema: &Arc<MapperSchema>, objs: &[Obj]) -> Result<Vec<Json>> {
        objs.iter()
            .map(|obj| Mapper::new(schema).obj(obj.clone()).serialize())
            .collect()
    }
}
