//! Field pipelines: input, validation, processing and output stages.
//!
//! Marshal and serialize share the same four-stage shape. Either of the first
//! two stages may stop the run early (missing optional key, read-only field),
//! which leaves the output untouched and is not an error.

use crate::collection;
use crate::error::{InvalidKind, Result};
use crate::field::{Field, FieldKind};
use crate::nested;
use crate::session::{Output, Session};
use crate::value::Value;
use serde_json::Value as Json;

/// Result of a stage that may end the run without error.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow<T> {
    Continue(T),
    Stop,
}

pub trait Pipeline {
    /// What the input stage extracts.
    type Raw;
    /// What the process stage hands to the output stage.
    type Processed;

    fn input(&self, field: &Field, session: &Session<'_>) -> Result<Flow<Self::Raw>>;

    fn validate(&self, field: &Field, session: &Session<'_>, raw: Self::Raw) -> Result<Self::Raw>;

    fn process(&self, field: &Field, session: &Session<'_>, raw: Self::Raw) -> Result<Self::Processed>;

    fn output(&self, field: &Field, session: &mut Session<'_>, value: Self::Processed) -> Result<()>;

    /// Run all four stages. Returns `false` when a stage stopped the run.
    fn run(&self, field: &Field, session: &mut Session<'_>) -> Result<bool> {
        let raw = match self.input(field, session)? {
            Flow::Continue(raw) => raw,
            Flow::Stop => {
                tracing::trace!(field = field.get_name(), "pipeline stopped");
                return Ok(false);
            }
        };
        let raw = self.validate(field, session, raw)?;
        let value = self.process(field, session, raw)?;
        self.output(field, session, value)?;
        Ok(true)
    }
}

/// External JSON → internal object.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarshalPipeline;

impl MarshalPipeline {
    /// Coerce one raw input and run the field's validators on the result.
    /// `null` has already been vetted by the input stage and passes through.
    pub(crate) fn check(field: &Field, session: &Session<'_>, raw: Json) -> Result<Json> {
        if raw.is_null() {
            return Ok(raw);
        }
        let coerced = field.coerce_scalar(raw).map_err(|kind| field.invalid(kind))?;
        for validator in &field.opts.validators {
            validator(session, &coerced).map_err(|kind| field.invalid(kind))?;
        }
        Ok(coerced)
    }

    /// Turn a checked input into an internal value. `existing` is the update
    /// target offered to nested fields.
    pub(crate) fn convert(
        field: &Field,
        session: &Session<'_>,
        raw: &Json,
        existing: Option<Value>,
    ) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        match &field.kind {
            FieldKind::Nested(opts) => nested::marshal_nested(field, opts, session, raw, existing),
            FieldKind::Collection(inner) => collection::marshal_collection(inner, session, raw, existing),
            _ => Ok(Value::from_json(raw)),
        }
    }
}

impl Pipeline for MarshalPipeline {
    type Raw = Json;
    type Processed = Value;

    fn input(&self, field: &Field, session: &Session<'_>) -> Result<Flow<Json>> {
        if field.is_read_only() {
            return Ok(Flow::Stop);
        }
        match session.data_get(field.get_name()) {
            None if session.partial => Ok(Flow::Stop),
            missing @ (None | Some(Json::Null)) => {
                let present = missing.is_some();
                if let Some(default) = field.default_value() {
                    Ok(Flow::Continue(default.clone()))
                } else if field.is_required() {
                    Err(field.invalid(InvalidKind::Required).into())
                } else if !present {
                    Ok(Flow::Stop)
                } else if !field.allows_none() {
                    Err(field.invalid(InvalidKind::NoneNotAllowed).into())
                } else {
                    Ok(Flow::Continue(Json::Null))
                }
            }
            Some(raw) => Ok(Flow::Continue(raw.clone())),
        }
    }

    fn validate(&self, field: &Field, session: &Session<'_>, raw: Json) -> Result<Json> {
        Self::check(field, session, raw)
    }

    fn process(&self, field: &Field, session: &Session<'_>, raw: Json) -> Result<Value> {
        let existing = if field.is_self_source() {
            None
        } else {
            session.output.as_object().and_then(|o| o.get(field.get_source()))
        };
        Self::convert(field, session, &raw, existing)
    }

    fn output(&self, field: &Field, session: &mut Session<'_>, value: Value) -> Result<()> {
        if field.is_self_source() {
            return Ok(());
        }
        if let Some(target) = session.output.as_object() {
            target.set(field.get_source(), value);
        }
        Ok(())
    }
}

/// Where a serialized value comes from.
#[derive(Debug, Clone)]
pub enum Source {
    /// Read from the internal object.
    Attr(Value),
    /// Already external: a default, a static value or `null`.
    Literal(Json),
}

/// Internal object → external JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializePipeline;

impl SerializePipeline {
    pub(crate) fn check(field: &Field, source: Source) -> Result<Source> {
        let value = match source {
            Source::Attr(value) => value,
            literal => return Ok(literal),
        };
        let shape_ok = match &field.kind {
            FieldKind::Nested(_) => value.as_object().is_some(),
            FieldKind::Collection(_) => value.as_list().is_some(),
            _ => true,
        };
        if !shape_ok {
            return Err(field.invalid(InvalidKind::TypeError).into());
        }
        Ok(Source::Attr(value))
    }

    pub(crate) fn convert(field: &Field, session: &Session<'_>, source: Source) -> Result<Json> {
        match source {
            Source::Literal(json) => Ok(json),
            Source::Attr(value) => match &field.kind {
                FieldKind::Nested(opts) => nested::serialize_nested(field, opts, session, value),
                FieldKind::Collection(inner) => collection::serialize_collection(inner, session, value),
                _ => Ok(value.to_json()),
            },
        }
    }
}

impl Pipeline for SerializePipeline {
    type Raw = Source;
    type Processed = Json;

    fn input(&self, field: &Field, session: &Session<'_>) -> Result<Flow<Source>> {
        if let FieldKind::Static(value) = &field.kind {
            return Ok(Flow::Continue(Source::Literal(value.clone())));
        }
        let Some(obj) = session.obj.as_ref().and_then(Value::as_object) else {
            return Ok(Flow::Stop);
        };
        if field.is_self_source() {
            return Ok(Flow::Continue(Source::Attr(Value::Object(obj.clone()))));
        }
        match obj.get(field.get_source()) {
            Some(Value::Null) => Ok(Flow::Continue(Source::Literal(Json::Null))),
            Some(value) => Ok(Flow::Continue(Source::Attr(value))),
            None => {
                if let Some(default) = field.default_value() {
                    Ok(Flow::Continue(Source::Literal(default.clone())))
                } else if field.is_required() {
                    Err(field.invalid(InvalidKind::Required).into())
                } else {
                    Ok(Flow::Stop)
                }
            }
        }
    }

    fn validate(&self, field: &Field, _session: &Session<'_>, source: Source) -> Result<Source> {
        Self::check(field, source)
    }

    fn process(&self, field: &Field, session: &Session<'_>, source: Source) -> Result<Json> {
        Self::convert(field, session, source)
    }

    fn output(&self, field: &Field, session: &mut Session<'_>, value: Json) -> Result<()> {
        if let Output::Map(map) = &mut session.output {
            map.insert(field.get_name().to_string(), value);
        }
        Ok(())
    }
}
