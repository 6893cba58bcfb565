use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Locks a request-local mutex, recovering the inner state if a panic poisoned it.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            lock_kind = "mutex.lock",
            result = "poisoned_recovered",
            "Recovered from poisoned request buffer lock"
        );
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn recovers_after_panic_while_held() {
        let shared = Arc::new(Mutex::new(vec![1]));
        let clone = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(shared.is_poisoned());
        let mut guard = mutex_lock(&shared, "cache::lock::tests", "push");
        guard.push(2);
        assert_eq!(*guard, vec![1, 2]);
    }
}
