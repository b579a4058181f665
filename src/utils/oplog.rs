//! Structured operation log with a thread-local sink for deterministic tests.
//!
//! Every line is a single JSON object routed to the `mimicdb::ops` log target. When a sink is
//! enabled on the current thread the same line is captured there, so tests can assert on it
//! without racing the global logger.

use std::cell::RefCell;

/// Log target used for op lines.
pub const OPS_TARGET: &str = "mimicdb::ops";

thread_local! {
    static TL_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Guard that disables the thread-local sink on drop.
pub struct OpSinkGuard;
impl Drop for OpSinkGuard {
    fn drop(&mut self) {
        TL_SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Enable the thread-local sink for the current thread.
pub fn enable_thread_sink() -> OpSinkGuard {
    TL_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    OpSinkGuard
}

fn write_str(msg: &str) {
    TL_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

/// Drain and return the captured lines. Empty when no sink is enabled.
pub fn drain() -> Vec<String> {
    TL_SINK.with(|s| match s.borrow_mut().as_mut() {
        Some(buf) => std::mem::take(buf),
        None => Vec::new(),
    })
}

/// Peek at the captured lines without clearing them.
pub fn snapshot() -> Vec<String> {
    TL_SINK.with(|s| s.borrow().as_ref().cloned().unwrap_or_default())
}

/// Builds `{"op": .., "collection": .., ...fields}` and emits it.
pub fn emit(op: &str, collection: &str, fields: serde_json::Value) {
    let mut line = serde_json::Map::new();
    line.insert("op".into(), op.into());
    line.insert("collection".into(), collection.into());
    if let serde_json::Value::Object(extra) = fields {
        line.extend(extra);
    }
    let s = serde_json::Value::Object(line).to_string();
    write_str(&s);
    log::info!(target: OPS_TARGET, "{s}");
}

/// Emit an op line: `oplog!("insert", name, {"n": 1})`.
#[macro_export]
macro_rules! oplog {
    ($op:expr, $collection:expr) => {
        $crate::utils::oplog::emit($op, $collection, ::serde_json::Value::Null)
    };
    ($op:expr, $collection:expr, { $($body:tt)* }) => {
        $crate::utils::oplog::emit($op, $collection, ::serde_json::json!({ $($body)* }))
    };
}
