use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock a store-local mutex, recovering the guard if a previous holder panicked.
///
/// Guarded state is a plain buffer of writes; a panic elsewhere cannot leave it
/// half-updated in a way later operations would misread.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "pending writes may include entries staged before the panic",
                "Recovered from poisoned store lock"
            );
            poisoned.into_inner()
        }
    }
}
