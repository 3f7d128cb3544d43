//! Executor-context marker
//!
//! An [`Engine`](crate::engine::Engine) may only be built on a thread that
//! has been marked as an executor context. The marker is thread-local and
//! never inherited by threads spawned from a marked one.

use std::cell::Cell;
use std::thread;

use crate::core::error::Result;

thread_local! {
    static ISOLATED: Cell<bool> = const { Cell::new(false) };
}

/// True on a thread marked as an executor context
pub fn is_isolated() -> bool {
    ISOLATED.with(|flag| flag.get())
}

/// Mark the calling thread as an executor context
///
/// For hosts that own a dedicated thread already. Everything else should go
/// through [`run_isolated`].
pub fn mark_current_thread() {
    ISOLATED.with(|flag| flag.set(true));
}

/// Run `f` on a fresh executor-context thread and return its result
///
/// A panic inside `f` is re-raised on the calling thread.
pub fn run_isolated<F, R>(name: &str, f: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
        mark_current_thread();
        f()
    })?;
    match handle.join() {
        Ok(value) => Ok(value),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_is_per_thread() {
        assert!(!is_isolated());
        let inside = run_isolated("isolation-test", is_isolated).unwrap();
        assert!(inside);
        assert!(!is_isolated());
    }

    #[test]
    fn test_spawned_threads_do_not_inherit() {
        let nested = run_isolated("isolation-outer", || {
            thread::spawn(is_isolated).join().unwrap_or(true)
        })
        .unwrap();
        assert!(!nested);
    }
}
