//! Field declarations: one named, typed schema node per external key.
//!
//! A [`Field`] pairs shared options ([`FieldOpts`]: name, source, required,
//! read-only, defaults, validators) with a [`FieldKind`] describing the shape
//! of the value. The marshal/serialize behaviour itself lives in
//! [`pipeline`](crate::pipeline); this module owns declaration, naming and the
//! scalar coercion rules.

use crate::error::{FieldError, FieldInvalid, InvalidKind};
use crate::nested::NestedOpts;
use crate::session::Session;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source sentinel: a nested mapper reads from and writes into the parent's own object.
pub const SELF_SOURCE: &str = "__self__";

static CREATION_ORDER: AtomicU64 = AtomicU64::new(1);

fn next_creation_order() -> u64 {
    CREATION_ORDER.fetch_add(1, Ordering::Relaxed)
}

/// Extra marshal validation run after the built-in checks, on the coerced input.
pub type Validator = Arc<dyn Fn(&Session<'_>, &Json) -> Result<(), InvalidKind> + Send + Sync>;

#[derive(Clone)]
pub struct FieldOpts {
    pub(crate) attribute_name: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) source: Option<String>,
    pub(crate) required: bool,
    pub(crate) read_only: bool,
    pub(crate) allow_none: bool,
    pub(crate) default: Option<Json>,
    pub(crate) choices: Option<Vec<Json>>,
    pub(crate) error_msgs: HashMap<String, String>,
    pub(crate) validators: Vec<Validator>,
}

impl Default for FieldOpts {
    fn default() -> Self {
        FieldOpts {
            attribute_name: None,
            name: None,
            source: None,
            required: false,
            read_only: false,
            allow_none: true,
            default: None,
            choices: None,
            error_msgs: HashMap::new(),
            validators: Vec::new(),
        }
    }
}

impl fmt::Debug for FieldOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldOpts")
            .field("attribute_name", &self.attribute_name)
            .field("name", &self.name)
            .field("source", &self.source)
            .field("required", &self.required)
            .field("read_only", &self.read_only)
            .field("allow_none", &self.allow_none)
            .field("default", &self.default)
            .field("choices", &self.choices)
            .field("error_msgs", &self.error_msgs)
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Shape of a field's value.
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Integer,
    Boolean { truthy: Vec<Json>, falsy: Vec<Json> },
    /// Serialize-only constant.
    Static(Json),
    Nested(NestedOpts),
    /// Homogeneous sequence of the wrapped field.
    Collection(Box<Field>),
}

#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) opts: FieldOpts,
    pub(crate) kind: FieldKind,
    creation_order: u64,
}

impl Field {
    fn new(kind: FieldKind) -> Self {
        Field {
            opts: FieldOpts::default(),
            kind,
            creation_order: next_creation_order(),
        }
    }

    pub fn string() -> Self {
        Field::new(FieldKind::String)
    }

    pub fn integer() -> Self {
        Field::new(FieldKind::Integer)
    }

    pub fn boolean() -> Self {
        Field::new(FieldKind::Boolean {
            truthy: vec![Json::Bool(true), "true".into(), "True".into(), "1".into(), 1.into()],
            falsy: vec![Json::Bool(false), "false".into(), "False".into(), "0".into(), 0.into()],
        })
    }

    /// Boolean accepting only the given input values.
    pub fn boolean_with(truthy: Vec<Json>, falsy: Vec<Json>) -> Self {
        Field::new(FieldKind::Boolean { truthy, falsy })
    }

    /// Always serializes to `value`; never marshaled.
    pub fn static_value(value: impl Into<Json>) -> Self {
        let mut field = Field::new(FieldKind::Static(value.into()));
        field.opts.read_only = true;
        field
    }

    pub fn nested(opts: impl Into<NestedOpts>) -> Self {
        Field::new(FieldKind::Nested(opts.into()))
    }

    /// Wrap `inner` in a collection. The collection owns the external key, so
    /// `inner` must not carry a name or source of its own.
    pub fn collection(inner: Field) -> Result<Self, FieldError> {
        if let Some(name) = &inner.opts.name {
            return Err(FieldError::WrappedFieldNamed(name.clone()));
        }
        if let Some(source) = &inner.opts.source {
            return Err(FieldError::WrappedFieldNamed(source.clone()));
        }
        Ok(Field::new(FieldKind::Collection(Box::new(inner))))
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.opts.name = Some(name.into());
        self.proxy_names();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.opts.source = Some(source.into());
        self.proxy_names();
        self
    }

    pub fn required(mut self) -> Self {
        self.opts.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.opts.read_only = true;
        self
    }

    pub fn allow_none(mut self, allow: bool) -> Self {
        self.opts.allow_none = allow;
        self
    }

    pub fn default(mut self, value: impl Into<Json>) -> Self {
        self.opts.default = Some(value.into());
        self
    }

    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Json>,
    {
        self.opts.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    /// Override the message reported for reason `code`.
    pub fn error_msg(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.opts.error_msgs.insert(code.into(), message.into());
        self
    }

    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Session<'_>, &Json) -> Result<(), InvalidKind> + Send + Sync + 'static,
    {
        self.opts.validators.push(Arc::new(f));
        self
    }

    /// Force the declaration position used when ordering a mapper's fields.
    pub fn creation_order(mut self, order: u64) -> Self {
        self.creation_order = order;
        self
    }

    /// Attach the attribute key this field was declared under.
    pub(crate) fn bind(&mut self, attribute_name: &str) {
        self.opts.attribute_name = Some(attribute_name.to_string());
        self.proxy_names();
    }

    fn proxy_names(&mut self) {
        if let FieldKind::Collection(inner) = &mut self.kind {
            inner.opts.attribute_name = self.opts.attribute_name.clone();
            inner.opts.name = self.opts.name.clone();
            inner.opts.source = self.opts.source.clone();
            inner.proxy_names();
        }
    }

    /// External key: the explicit name, else the attribute key.
    pub fn get_name(&self) -> &str {
        self.opts
            .name
            .as_deref()
            .or(self.opts.attribute_name.as_deref())
            .unwrap_or_default()
    }

    /// Internal attribute key: the explicit source, else the name.
    pub fn get_source(&self) -> &str {
        self.opts.source.as_deref().unwrap_or_else(|| self.get_name())
    }

    pub fn attribute_name(&self) -> Option<&str> {
        self.opts.attribute_name.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.opts.required
    }

    pub fn is_read_only(&self) -> bool {
        self.opts.read_only
    }

    pub fn allows_none(&self) -> bool {
        self.opts.allow_none
    }

    pub fn default_value(&self) -> Option<&Json> {
        self.opts.default.as_ref()
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn get_creation_order(&self) -> u64 {
        self.creation_order
    }

    pub(crate) fn is_self_source(&self) -> bool {
        self.get_source() == SELF_SOURCE
    }

    /// Build the error for `kind`, honouring `error_msgs` overrides.
    pub fn invalid(&self, kind: InvalidKind) -> FieldInvalid {
        let err = FieldInvalid::new(self.get_name(), kind);
        match self.opts.error_msgs.get(err.kind.code()) {
            Some(msg) => err.with_message(msg.clone()),
            None => err,
        }
    }

    /// Coerce a raw scalar input and check it against `choices`.
    pub(crate) fn coerce_scalar(&self, raw: Json) -> Result<Json, InvalidKind> {
        let coerced = self.kind.coerce(raw)?;
        match &self.opts.choices {
            Some(choices) if !choices.contains(&coerced) => Err(InvalidKind::InvalidChoice),
            _ => Ok(coerced),
        }
    }
}

impl FieldKind {
    fn coerce(&self, raw: Json) -> Result<Json, InvalidKind> {
        match self {
            FieldKind::String => match raw {
                Json::String(_) => Ok(raw),
                Json::Number(n) => Ok(Json::String(n.to_string())),
                Json::Bool(b) => Ok(Json::String(b.to_string())),
                _ => Err(InvalidKind::TypeError),
            },
            FieldKind::Integer => coerce_integer(&raw).map(Json::from).ok_or(InvalidKind::TypeError),
            FieldKind::Boolean { truthy, falsy } => {
                if truthy.contains(&raw) {
                    Ok(Json::Bool(true))
                } else if falsy.contains(&raw) {
                    Ok(Json::Bool(false))
                } else {
                    Err(InvalidKind::TypeError)
                }
            }
            FieldKind::Static(_) => Ok(raw),
            FieldKind::Nested(_) => match raw {
                Json::Object(_) => Ok(raw),
                _ => Err(InvalidKind::TypeError),
            },
            FieldKind::Collection(_) => match raw {
                Json::Array(_) => Ok(raw),
                _ => Err(InvalidKind::TypeError),
            },
        }
    }
}

fn coerce_integer(raw: &Json) -> Option<i64> {
    match raw {
        Json::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            (f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64).then(|| f.trunc() as i64)
        }),
        Json::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
