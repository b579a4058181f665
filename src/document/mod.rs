//! Stored documents: field-name rules, id placement and id generation.

mod core;
mod types;

pub use bson::Document;
pub use self::core::{validate_id, validate_keys, with_id};
pub use self::types::{IdGenerator, IdKey, ObjectIdGenerator, UuidGenerator};
