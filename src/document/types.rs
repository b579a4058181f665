use bson::Bson;
use bson::oid::ObjectId;
use ordered_float::OrderedFloat;
use uuid::Uuid;

/// Hashable normal form of an `_id` value, used as the store key.
///
/// Numerically equal ids collide regardless of their BSON width, so `1`, `1i64` and `1.0`
/// address the same document. Embedded documents are keyed by their fields sorted by name,
/// so `{x: 1, y: 2}` and `{y: 2, x: 1}` are the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    ObjectId([u8; 12]),
    DateTime(i64),
    Doc(Vec<(String, IdKey)>),
    Array(Vec<IdKey>),
    Other(String),
}

impl From<&Bson> for IdKey {
    fn from(v: &Bson) -> Self {
        match v {
            Bson::Null | Bson::Undefined => Self::Null,
            Bson::Boolean(b) => Self::Bool(*b),
            Bson::Int32(i) => Self::Int(i64::from(*i)),
            Bson::Int64(i) => Self::Int(*i),
            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            Bson::Double(f)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Self::Int(*f as i64)
            }
            Bson::Double(f) => Self::Float(OrderedFloat(*f)),
            Bson::String(s) | Bson::Symbol(s) => Self::Str(s.clone()),
            Bson::ObjectId(oid) => Self::ObjectId(oid.bytes()),
            Bson::DateTime(dt) => Self::DateTime(dt.timestamp_millis()),
            Bson::Document(d) => {
                let mut fields: Vec<(String, IdKey)> =
                    d.iter().map(|(k, v)| (k.clone(), Self::from(v))).collect();
                fields.sort_by(|a, b| a.0.cmp(&b.0));
                Self::Doc(fields)
            }
            Bson::Array(items) => Self::Array(items.iter().map(Self::from).collect()),
            other => Self::Other(other.to_string()),
        }
    }
}

/// Source of `_id` values for documents inserted without one.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Bson;
}

/// MongoDB-style 12-byte ObjectIds. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectIdGenerator;

impl IdGenerator for ObjectIdGenerator {
    fn generate(&self) -> Bson {
        Bson::ObjectId(ObjectId::new())
    }
}

/// Random v4 UUIDs rendered as strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> Bson {
        Bson::String(Uuid::new_v4().to_string())
    }
}
