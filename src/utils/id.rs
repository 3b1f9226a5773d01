//! Id generation for stream units (text blocks, approvals, messages).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Generates unique ids.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Random ids with the given prefix, e.g. `aitxt-3f2a...`.
pub fn create_id_generator(prefix: &'static str) -> IdGenerator {
    Arc::new(move || format!("{prefix}-{}", uuid::Uuid::new_v4().simple()))
}

/// Deterministic ids `prefix-0`, `prefix-1`, ... for reproducible tests.
pub fn sequential_id_generator(prefix: &'static str) -> IdGenerator {
    let counter = AtomicUsize::new(0);
    Arc::new(move || format!("{prefix}-{}", counter.fetch_add(1, Ordering::Relaxed)))
}
