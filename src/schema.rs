//! Mapper schemas: the frozen set of fields and roles a mapper works with.
//!
//! A schema is declared through [`MapperBuilder`]. Bases are walked the same
//! way a class hierarchy would be, most-base first: for `extends(a).extends(b)`
//! the order is `b`, `a`, then the builder's own declarations. Each step
//! overwrites fields and roles of the same key. Fields are then sorted by
//! creation order, and `__default__` is synthesized (all fields) unless some
//! step declared it.

use crate::error::{FieldInvalid, MapperError, Result};
use crate::field::Field;
use crate::registry;
use crate::role::{Role, DEFAULT_ROLE};
use crate::session::Session;
use crate::value::{Obj, ObjectType};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Whole-object check run after every field of a marshal call succeeded.
pub type MapperValidator = Arc<dyn Fn(&Session<'_>, &Obj) -> Result<(), FieldInvalid> + Send + Sync>;

/// Roles contributed by a non-mapper ancestor.
#[derive(Debug, Clone, Default)]
pub struct RoleMixin {
    roles: Vec<(String, Role)>,
}

impl RoleMixin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, name: impl Into<String>, role: impl Into<Role>) -> Self {
        self.roles.push((name.into(), role.into()));
        self
    }
}

/// One ancestor of a mapper.
#[derive(Debug, Clone)]
pub enum Base {
    Mapper(Arc<MapperSchema>),
    Mixin(RoleMixin),
}

impl From<Arc<MapperSchema>> for Base {
    fn from(schema: Arc<MapperSchema>) -> Self {
        Base::Mapper(schema)
    }
}

impl From<&Arc<MapperSchema>> for Base {
    fn from(schema: &Arc<MapperSchema>) -> Self {
        Base::Mapper(Arc::clone(schema))
    }
}

impl From<RoleMixin> for Base {
    fn from(mixin: RoleMixin) -> Self {
        Base::Mixin(mixin)
    }
}

pub struct MapperSchema {
    name: String,
    object_type: Option<ObjectType>,
    /// Attribute key → field, sorted by creation order.
    fields: Vec<(String, Field)>,
    /// Roles declared somewhere in the chain, without the synthesized default.
    explicit_roles: BTreeMap<String, Role>,
    roles: BTreeMap<String, Role>,
    validators: Vec<MapperValidator>,
}

impl MapperSchema {
    pub fn builder(name: impl Into<String>) -> MapperBuilder {
        MapperBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type instantiated when marshaling has to create an object.
    pub fn object_type(&self) -> Result<&ObjectType> {
        self.object_type
            .as_ref()
            .ok_or_else(|| MapperError::MissingType(self.name.clone()))
    }

    pub fn declared_fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, f)| (k.as_str(), f))
    }

    pub fn field(&self, attribute_name: &str) -> Option<&Field> {
        self.fields.iter().find(|(k, _)| k == attribute_name).map(|(_, f)| f)
    }

    /// Attribute keys in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Every role, including `__default__`.
    pub fn declared_roles(&self) -> &BTreeMap<String, Role> {
        &self.roles
    }

    pub fn role(&self, name: &str) -> Result<&Role> {
        self.roles.get(name).ok_or_else(|| MapperError::UnknownRole {
            mapper: self.name.clone(),
            role: name.to_string(),
        })
    }

    /// Fields taking part under `role`, in declaration order.
    pub fn active_fields(&self, role: &str) -> Result<Vec<&Field>> {
        let role = self.role(role)?;
        Ok(self
            .fields
            .iter()
            .filter(|(k, _)| role.contains(k))
            .map(|(_, f)| f)
            .collect())
    }

    pub(crate) fn validators(&self) -> &[MapperValidator] {
        &self.validators
    }
}

impl fmt::Debug for MapperSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperSchema")
            .field("name", &self.name)
            .field("object_type", &self.object_type)
            .field("fields", &self.field_names())
            .field("roles", &self.roles)
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Declares a mapper. [`build`](MapperBuilder::build) freezes and registers it.
pub struct MapperBuilder {
    name: String,
    object_type: Option<ObjectType>,
    bases: Vec<Base>,
    fields: Vec<(String, Field)>,
    roles: Vec<(String, Role)>,
    validators: Vec<MapperValidator>,
}

impl MapperBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        MapperBuilder {
            name: name.into(),
            object_type: None,
            bases: Vec::new(),
            fields: Vec::new(),
            roles: Vec::new(),
            validators: Vec::new(),
        }
    }

    pub fn object_type(mut self, object_type: impl Into<ObjectType>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    /// Add an ancestor. Later bases are more base than earlier ones.
    pub fn extends(mut self, base: impl Into<Base>) -> Self {
        self.bases.push(base.into());
        self
    }

    pub fn field(mut self, attribute_name: impl Into<String>, field: Field) -> Self {
        self.fields.push((attribute_name.into(), field));
        self
    }

    pub fn role(mut self, name: impl Into<String>, role: impl Into<Role>) -> Self {
        self.roles.push((name.into(), role.into()));
        self
    }

    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Session<'_>, &Obj) -> Result<(), FieldInvalid> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(f));
        self
    }

    /// Collect fields and roles across the bases without registering.
    pub fn finish(self) -> MapperSchema {
        let mut fields: HashMap<String, Field> = HashMap::new();
        let mut roles: BTreeMap<String, Role> = BTreeMap::new();
        let mut object_type = None;
        let mut validators = Vec::new();

        for base in self.bases.iter().rev() {
            match base {
                Base::Mapper(schema) => {
                    for (key, field) in &schema.fields {
                        fields.insert(key.clone(), field.clone());
                    }
                    roles.extend(schema.explicit_roles.iter().map(|(k, r)| (k.clone(), r.clone())));
                    if schema.object_type.is_some() {
                        object_type = schema.object_type.clone();
                    }
                    validators.extend(schema.validators.iter().cloned());
                }
                Base::Mixin(mixin) => {
                    roles.extend(mixin.roles.iter().cloned());
                }
            }
        }

        for (key, mut field) in self.fields {
            field.bind(&key);
            fields.insert(key, field);
        }
        roles.extend(self.roles);
        if self.object_type.is_some() {
            object_type = self.object_type;
        }
        validators.extend(self.validators);

        let mut fields: Vec<(String, Field)> = fields.into_iter().collect();
        fields.sort_by(|(ka, a), (kb, b)| {
            a.get_creation_order()
                .cmp(&b.get_creation_order())
                .then_with(|| ka.cmp(kb))
        });

        let explicit_roles = roles.clone();
        if !roles.contains_key(DEFAULT_ROLE) {
            roles.insert(
                DEFAULT_ROLE.to_string(),
                Role::whitelist(fields.iter().map(|(k, _)| k.clone())),
            );
        }

        tracing::debug!(
            mapper = %self.name,
            fields = fields.len(),
            roles = roles.len(),
            "mapper schema collected"
        );

        MapperSchema {
            name: self.name,
            object_type,
            fields,
            explicit_roles,
            roles,
            validators,
        }
    }

    /// Freeze the schema and register it under its name.
    pub fn build(self) -> Arc<MapperSchema> {
        let schema = Arc::new(self.finish());
        registry::register(Arc::clone(&schema));
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(schema: &MapperSchema) -> Vec<&str> {
        schema.field_names()
    }

    #[test]
    fn fields_follow_creation_order() {
        let schema = MapperBuilder::new("SchemaOrder")
            .field("c", Field::string().creation_order(3))
            .field("a", Field::string().creation_order(1))
            .field("b", Field::string().creation_order(2))
            .finish();
        assert_eq!(names(&schema), ["a", "b", "c"]);
    }

    #[test]
    fn redeclared_field_moves() {
        let base = Arc::new(
            MapperBuilder::new("SchemaRedeclareBase")
                .field("id", Field::string())
                .field("name", Field::string())
                .finish(),
        );
        let child = MapperBuilder::new("SchemaRedeclareChild")
            .extends(&base)
            .field("id", Field::integer())
            .finish();
        assert_eq!(names(&child), ["name", "id"]);
        assert!(matches!(
            child.field("id").map(Field::kind),
            Some(crate::field::FieldKind::Integer)
        ));

        let forced = MapperBuilder::new("SchemaRedeclareForced")
            .extends(&base)
            .field("name", Field::string().creation_order(0))
            .finish();
        assert_eq!(names(&forced), ["name", "id"]);
    }

    #[test]
    fn default_role_synthesized_unless_declared() {
        let schema = MapperBuilder::new("SchemaDefaultRole")
            .field("id", Field::string())
            .field("name", Field::string())
            .role("public", ["name"])
            .finish();
        let default = schema.role(DEFAULT_ROLE).expect("default role");
        assert_eq!(default.fields(), ["id", "name"]);

        let overridden = MapperBuilder::new("SchemaDefaultOverride")
            .field("id", Field::string())
            .field("name", Field::string())
            .role(DEFAULT_ROLE, ["name"])
            .finish();
        let active: Vec<&str> = overridden
            .active_fields(DEFAULT_ROLE)
            .expect("default role")
            .iter()
            .map(|f| f.get_name())
            .collect();
        assert_eq!(active, ["name"]);
    }

    #[test]
    fn unknown_role_is_reported() {
        let schema = MapperBuilder::new("SchemaUnknownRole").finish();
        let err = schema.role("nope").expect_err("missing role");
        assert!(matches!(err, MapperError::UnknownRole { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn missing_object_type_is_lazy() {
        let schema = MapperBuilder::new("SchemaNoType").field("id", Field::string()).finish();
        assert!(matches!(schema.object_type(), Err(MapperError::MissingType(_))));
    }
}
