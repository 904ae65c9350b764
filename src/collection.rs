//! Collection fields: one wrapped field applied to every element.
//!
//! Marshaling pairs each input element with the existing element at the same
//! index (if any) and offers it to the wrapped field as its update target.
//! Output is always a fresh list in input order.

use crate::error::{InvalidKind, Result};
use crate::field::{Field, FieldKind};
use crate::pipeline::{MarshalPipeline, SerializePipeline, Source};
use crate::session::Session;
use crate::value::Value;
use serde_json::Value as Json;

/// In-place nested updates cannot grow a list: every element needs an existing target.
fn requires_existing(inner: &Field) -> bool {
    matches!(&inner.kind, FieldKind::Nested(opts) if opts.uses_existing() && !opts.allow_create)
}

pub(crate) fn marshal_collection(
    inner: &Field,
    session: &Session<'_>,
    raw: &Json,
    existing: Option<Value>,
) -> Result<Value> {
    let items = raw
        .as_array()
        .ok_or_else(|| inner.invalid(InvalidKind::TypeError))?;
    let existing = match existing {
        Some(Value::List(list)) => Some(list),
        _ => None,
    };
    let strict = requires_existing(inner);

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let aligned = existing.as_ref().and_then(|list| list.get(i).cloned());
        if aligned.is_none() && strict && existing.is_some() {
            tracing::trace!(field = inner.get_name(), index = i, "no existing element to update");
            return Err(inner.invalid(InvalidKind::TooMany).into());
        }
        if item.is_null() && !inner.allows_none() {
            return Err(inner.invalid(InvalidKind::NoneNotAllowed).into());
        }
        let checked = MarshalPipeline::check(inner, session, item.clone())?;
        out.push(MarshalPipeline::convert(inner, session, &checked, aligned)?);
    }
    Ok(Value::List(out))
}

pub(crate) fn serialize_collection(inner: &Field, session: &Session<'_>, value: Value) -> Result<Json> {
    let Value::List(items) = value else {
        return Err(inner.invalid(InvalidKind::TypeError).into());
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Null => Ok(Json::Null),
            item => {
                let source = SerializePipeline::check(inner, Source::Attr(item))?;
                SerializePipeline::convert(inner, session, source)
            }
        })
        .collect::<Result<Vec<_>>>()
        .map(Json::Array)
}
