//! # fieldmap — Schema-driven JSON ⇄ object mapping
//!
//! Declare a mapper once, then use it in both directions:
//! **marshal** untyped JSON input into typed internal objects, and
//! **serialize** internal objects back into JSON.
//!
//! ## Building blocks
//!
//! - **Fields**: `string`, `integer`, `boolean`, `static_value`, `nested`, `collection`
//! - **Options**: `name` / `source` renaming, `required`, `read_only`, `allow_none`,
//!   `default`, `choices`, custom validators and error messages
//! - **Roles**: whitelist or blacklist subsets of fields, inherited and overridable
//! - **Nested policies**: getter lookup, `allow_create`, `allow_updates`,
//!   `allow_updates_in_place`, `allow_partial_updates`, `__self__` flattening
//! - **Change tracking**: old/new pairs for every field a marshal call changed
//!
//! ## Example
//!
//! ```
//! use fieldmap::{Field, Mapper, MapperSchema, NestedOpts};
//! use serde_json::json;
//!
//! MapperSchema::builder("ExampleAuthor")
//!     .object_type("Author")
//!     .field("name", Field::string())
//!     .build();
//!
//! let posts = MapperSchema::builder("ExamplePost")
//!     .object_type("Post")
//!     .field("title", Field::string().required())
//!     .field("author", Field::nested(NestedOpts::new("ExampleAuthor").allow_create()))
//!     .role("summary", ["title"])
//!     .build();
//!
//! let data = json!({"title": "Hello", "author": {"name": "mike"}});
//! let post = Mapper::new(&posts).data(&data).marshal().unwrap();
//!
//! let summary = Mapper::new(&posts).obj(post).serialize_role("summary").unwrap();
//! assert_eq!(summary, json!({"title": "Hello"}));
//! ```
//!
//! ## Usage
//!
//! See `tests/integration.rs` and `tests/nested.rs` for full examples.

pub mod changes;
mod collection;
pub mod error;
pub mod field;
pub mod mapper;
pub mod nested;
pub mod pipeline;
pub mod registry;
pub mod role;
pub mod schema;
pub mod session;
pub mod value;

pub use changes::{Change, Changes};
pub use error::{FieldError, FieldInvalid, InvalidKind, MapperError, Result};
pub use field::{Field, FieldKind, Validator, SELF_SOURCE};
pub use mapper::{Limits, Mapper};
pub use nested::{Getter, MapperRef, NestedOpts};
pub use pipeline::{Flow, MarshalPipeline, Pipeline, SerializePipeline, Source};
pub use role::{Role, DEFAULT_ROLE};
pub use schema::{Base, MapperBuilder, MapperSchema, MapperValidator, RoleMixin};
pub use session::{Output, Session};
pub use value::{Obj, ObjectType, Value};
