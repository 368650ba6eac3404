//! Flat teardown of nested computations.
//!
//! A chain that is dropped without running, or a stack of completions released
//! together, nests one level per combinator. Letting the compiler-generated
//! drop glue walk it recurses once per level. Combinators hand their children
//! to [`defer_drop`] instead: the outermost call on a thread drops values in a
//! loop, and drops that happen inside that loop only queue their children.

use std::{
    any::Any,
    cell::{Cell, RefCell},
};

thread_local! {
    static DRAINING: Cell<bool> = const { Cell::new(false) };
    static PENDING: RefCell<Vec<Box<dyn Any>>> = const { RefCell::new(Vec::new()) };
}

// Clears the drain flag when the outermost loop exits, also on unwind.
struct Reset;

impl Drop for Reset {
    fn drop(&mut self) {
        let _ = DRAINING.try_with(|draining| draining.set(false));
    }
}

fn pop() -> Option<Box<dyn Any>> {
    PENDING
        .try_with(|pending| pending.borrow_mut().pop())
        .ok()
        .flatten()
}

/// Drops `value` without growing the stack by the depth of what it owns.
pub(crate) fn defer_drop<V: 'static>(value: V) {
    match DRAINING.try_with(|draining| draining.replace(true)) {
        Ok(false) => {
            let _reset = Reset;
            drop(value);
            while let Some(next) = pop() {
                drop(next);
            }
        }
        Ok(true) => {
            let mut value = Some(Box::new(value) as Box<dyn Any>);
            let _ = PENDING.try_with(|pending| {
                if let Some(value) = value.take() {
                    pending.borrow_mut().push(value);
                }
            });
            // Thread-local storage is being torn down; drop in place.
            drop(value);
        }
        Err(_) => drop(value),
    }
}
