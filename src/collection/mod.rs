//! The document store: one named collection and every CRUD operation on it.

mod core;
mod index_admin;
mod ops;
mod report;

pub use self::core::Collection;
pub use self::ops::{FindAndModify, UpdateOptions};
pub use self::report::{DeleteReport, UpdateReport};
