use bson::{Bson, Document};

use crate::query::ElemMatch;

/// A compiled update specification.
#[derive(Debug, Clone)]
pub enum UpdateSpec {
    /// Replace every field but `_id`.
    Replace(Document),
    /// Apply modifiers in declaration order.
    Modify(Vec<Modifier>),
}

impl UpdateSpec {
    #[must_use]
    pub const fn is_replacement(&self) -> bool {
        matches!(self, Self::Replace(_))
    }
}

/// One modifier applied to one field path. The path may hold a single `$` segment.
#[derive(Debug, Clone)]
pub struct Modifier {
    pub path: String,
    pub op: ModifierOp,
}

#[derive(Debug, Clone)]
pub enum ModifierOp {
    Set(Bson),
    /// Only applied when the update creates the document.
    SetOnInsert(Bson),
    Unset,
    Inc(Bson),
    Mul(Bson),
    Min(Bson),
    Max(Bson),
    /// Target path.
    Rename(String),
    AddToSet(Vec<Bson>),
    Push(PushSpec),
    Pull(PullCriteria),
    PullAll(Vec<Bson>),
    Pop(PopEnd),
    CurrentDate(DateKind),
}

#[derive(Debug, Clone, Default)]
pub struct PushSpec {
    pub values: Vec<Bson>,
    /// Insertion point; negative counts from the end.
    pub position: Option<i64>,
    /// Keep the first `n` (or last `-n`) elements afterwards.
    pub slice: Option<i64>,
}

/// What `$pull` removes.
#[derive(Debug, Clone)]
pub enum PullCriteria {
    Equals(Bson),
    Matching(ElemMatch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopEnd {
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    Date,
    Timestamp,
}
