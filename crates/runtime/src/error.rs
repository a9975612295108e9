//! Thread-local last-error storage for the primitive-failure reporting
//! surfaces named in §6 (the `%defined?`-adjacent family).
//!
//! Grounded on the runtime crate's `error.rs`, minus the C-string caching:
//! there is no FFI boundary in scope here, just a `Condition` a caller can
//! take and inspect.

use std::cell::RefCell;

use crate::condition::Condition;

thread_local! {
    static LAST_ERROR: RefCell<Option<Condition>> = const { RefCell::new(None) };
}

/// Record the last condition raised by a primitive on this thread.
pub fn set_last_error(c: Condition) {
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(c));
}

/// Take (and clear) the last recorded condition.
pub fn take_last_error() -> Option<Condition> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

pub fn has_last_error() -> bool {
    LAST_ERROR.with(|e| e.borrow().is_some())
}

pub fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_take_roundtrip() {
        clear_last_error();
        assert!(!has_last_error());
        set_last_error(Condition::IoEof);
        assert!(has_last_error());
        let taken = take_last_error();
        assert!(matches!(taken, Some(Condition::IoEof)));
        assert!(!has_last_error());
    }
}
