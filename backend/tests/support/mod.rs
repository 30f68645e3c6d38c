//! Helpers shared by the integration tests.

use std::sync::Mutex;

/// Serializes tests touching process-wide environment variables.
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` with the given variables set (`Some`) or removed (`None`).
///
/// The previous values come back when `f` returns or panics.
#[allow(dead_code)]
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _restore = EnvRestore::apply(changes);
    f()
}

struct EnvRestore {
    previous: Vec<(String, Option<String>)>,
}

impl EnvRestore {
    fn apply(changes: &[(&str, Option<&str>)]) -> Self {
        let mut previous: Vec<(String, Option<String>)> = Vec::with_capacity(changes.len());
        for (key, value) in changes {
            if !previous.iter().any(|(k, _)| k == key) {
                previous.push((key.to_string(), std::env::var(key).ok()));
            }
            set(key, *value);
        }
        Self { previous }
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..).rev() {
            set(&key, value.as_deref());
        }
    }
}

fn set(key: &str, value: Option<&str>) {
    match value {
        Some(value) => std::env::set_var(key, value),
        None => std::env::remove_var(key),
    }
}
