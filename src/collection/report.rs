use bson::{Bson, Document, doc};

/// Outcome of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
    pub updated_existing: bool,
    pub acknowledged: bool,
}

impl Default for UpdateReport {
    fn default() -> Self {
        Self { matched: 0, modified: 0, upserted_id: None, updated_existing: false, acknowledged: true }
    }
}

impl UpdateReport {
    /// Legacy write-result shape: `n`, `nModified`, `updatedExisting`, `upserted`, `ok`, `err`.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let n = if self.upserted_id.is_some() { 1 } else { self.matched };
        let mut out = doc! {
            "n": count(n),
            "nModified": count(self.modified),
            "updatedExisting": self.updated_existing,
        };
        if let Some(id) = &self.upserted_id {
            out.insert("upserted", id.clone());
        }
        out.insert("ok", 1.0);
        out.insert("err", Bson::Null);
        out
    }
}

/// Outcome of a delete.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: u64,
}

impl DeleteReport {
    #[must_use]
    pub fn to_document(&self) -> Document {
        doc! {"n": count(self.deleted), "ok": 1.0, "err": Bson::Null}
    }
}

fn count(n: u64) -> Bson {
    i32::try_from(n).map_or_else(|_| Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX)), Bson::Int32)
}
