use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Pool of group names, so every `Group` with the same name shares one
/// allocation and name comparisons usually stop at the pointer.
static GROUP_INTERN: Lazy<DashMap<Box<str>, Arc<str>>> = Lazy::new(DashMap::new);

/// Returns the interned `Arc<str>` for a group name.
#[inline]
pub(crate) fn intern_name<S: AsRef<str>>(name: S) -> Arc<str> {
    let key = name.as_ref();
    if let Some(existing) = GROUP_INTERN.get(key) {
        return existing.clone();
    }
    GROUP_INTERN
        .entry(Box::from(key))
        .or_insert_with(|| Arc::from(key))
        .clone()
}
