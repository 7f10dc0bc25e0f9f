//! In-memory entity store with automatic history and declarative cascades.
//!
//! Every stored row carries a `[valid_from, valid_to)` validity interval.
//! The active version of a record is the one whose interval is still open;
//! mutations never lose data, they close the old interval and keep it as an
//! immutable historical row. Associations between entities are declared
//! once at registration, and saves, deletes and restores walk the resulting
//! graph with a single clock so related records share one interval start.
//!
//! ```
//! use serde_json::json;
//! use temporadb::{Association, CascadeAction, DataType, EntityDescriptor, TemporalDb, Value};
//!
//! # fn main() -> temporadb::Result<()> {
//! let db = TemporalDb::new();
//! db.register(
//!     EntityDescriptor::new("users")
//!         .with_column("name", DataType::Text)
//!         .with_association(
//!             Association::owning_many("posts", "posts", "user_id")
//!                 .cascade_on_delete(CascadeAction::Cascade),
//!         ),
//! )?;
//! db.register(
//!     EntityDescriptor::new("posts")
//!         .with_column("user_id", DataType::Integer)
//!         .with_column("title", DataType::Text),
//! )?;
//!
//! let user = db.save(
//!     "users",
//!     &json!({ "name": "ada", "posts": [{ "title": "hello" }] }),
//! )?;
//! assert_eq!(user.key(), Value::Integer(1));
//!
//! db.delete("users", &user.key())?;
//! assert!(db.find("users", &user.key())?.is_none());
//! assert!(db.find("posts", &Value::Integer(1))?.is_none());
//! # Ok(())
//! # }
//! ```

pub mod association;
pub mod core;
mod engine;
pub mod entity;
pub mod facade;
pub mod storage;
pub mod temporal;

pub use association::{Association, AssociationRegistry, CascadeAction, RelationKind};
pub use core::{CascadeError, Column, DataType, Result, Row, Schema, Value};
pub use entity::{EntityDescriptor, KeyType, Record};
pub use facade::TemporalDb;
pub use storage::{Filter, FilterOp};
pub use temporal::{END_OF_TIME, TemporalConfig, TemporalScope, Timestamp};
