//! Per-call context threaded through field pipelines.

use crate::changes::Changes;
use crate::mapper::Mapper;
use crate::value::{Obj, Value};
use serde_json::{Map, Value as Json};
use std::cell::RefCell;

/// Destination of a pipeline run.
#[derive(Debug)]
pub enum Output {
    /// Nothing to write into yet (getter lookups).
    Empty,
    /// Internal object being marshaled into.
    Object(Obj),
    /// External mapping being serialized into.
    Map(Map<String, Json>),
}

impl Output {
    pub fn as_object(&self) -> Option<&Obj> {
        match self {
            Output::Object(o) => Some(o),
            _ => None,
        }
    }
}

/// Transient context for one marshal/serialize call of one mapper.
///
/// Child sessions are created for every nested recursion and point back at
/// the session that spawned them. `partial` is inherited unless the nested
/// field forces partial updates.
pub struct Session<'a> {
    pub mapper: &'a Mapper<'a>,
    /// External input (marshal).
    pub data: Option<&'a Json>,
    /// Existing internal value: the update target when marshaling, the source when serializing.
    pub obj: Option<Value>,
    pub output: Output,
    pub partial: bool,
    pub parent: Option<&'a Session<'a>>,
    pub(crate) changes: RefCell<Changes>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(
        mapper: &'a Mapper<'a>,
        data: Option<&'a Json>,
        obj: Option<Value>,
        output: Output,
        parent: Option<&'a Session<'a>>,
    ) -> Self {
        Session {
            mapper,
            data,
            obj,
            output,
            partial: mapper.is_partial(),
            parent,
            changes: RefCell::new(Changes::default()),
        }
    }

    /// Number of sessions above this one.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = self.parent;
        while let Some(s) = cur {
            depth += 1;
            cur = s.parent;
        }
        depth
    }

    /// The session of the outermost mapper call.
    pub fn root(&self) -> &Session<'a> {
        let mut cur = self;
        while let Some(parent) = cur.parent {
            cur = parent;
        }
        cur
    }

    /// Look up a key in the external input of this session.
    pub fn data_get(&self, key: &str) -> Option<&'a Json> {
        self.data.and_then(|d| d.get(key))
    }

    pub(crate) fn into_changes(self) -> Changes {
        self.changes.into_inner()
    }
}
