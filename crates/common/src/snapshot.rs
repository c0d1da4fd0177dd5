//! Deep copy and structural equality primitives.
//!
//! Baselines and working copies must never alias each other: an edit to a
//! working copy that leaked into its baseline would make every later diff
//! compare the record against itself. The engine therefore only ever stores
//! values produced by [`deep_clone`], and only ever compares them with
//! [`deep_equals`].
//!
//! Record types must own their data. A record holding shared interior
//! mutability (`Rc<RefCell<_>>`, `Arc<Mutex<_>>`) clones the handle, not the
//! contents, and loses isolation between snapshots.

use serde_json::Value;
use std::fmt;

/// Contract for every value the engine tracks.
///
/// Blanket-implemented: any owned, comparable, debuggable type qualifies.
pub trait Record: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> Record for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// Structurally independent copy of `record`.
///
/// `deep_equals(r, &deep_clone(r))` always holds.
pub fn deep_clone<T: Record>(record: &T) -> T {
    record.clone()
}

/// Structural equality, independent of where either value lives.
pub fn deep_equals<T: Record>(a: &T, b: &T) -> bool {
    a == b
}

/// Equality over optional records: both absent is equal, one absent is not.
pub fn deep_equals_opt<T: Record>(a: Option<&T>, b: Option<&T>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => deep_equals(a, b),
        _ => false,
    }
}

/// Structural equality over dynamic property values.
///
/// Numbers compare by value across integer and float representations, so a
/// property serialized as `1` equals a caller-supplied `1.0`. Absent values
/// follow the same rule as [`deep_equals_opt`].
pub fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => value_eq(a, b),
        _ => false,
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x == y {
                return true;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| value_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| value_eq(x, y)))
        }
        _ => a == b,
    }
}
