// src/core/contain.rs

//! Turns a panic in handler or plugin code into an error value.
//!
//! A plugin module links its own copy of the standard library, and a panic
//! unwinding out of it into the server aborts the process. `contain` is
//! generic, so each instantiation is compiled into the library that owns the
//! wrapped code and catches the panic with that library's runtime. Callers
//! on the server side then only ever see a `Result`.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Runs `f`, returning the panic message if it panicked.
pub fn contain<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| panic_message(panic.as_ref()))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
