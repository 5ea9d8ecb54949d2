//! Thread-local circuit breaker for recursive self-description.
//!
//! Diagnostic structures can end up referencing themselves; describing one
//! naively recurses until the stack is gone and takes the process with it.
//! The guard does not detect cycles. It only counts nesting depth on the
//! current thread and, past the bound, answers with a placeholder.

use log::warn;
use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Holds one level of description depth; released on drop, including unwinds.
pub struct DepthGuard {
    _private: (),
}

impl DepthGuard {
    /// Enters one level, or `None` when the thread is already `bound` deep.
    pub fn enter(bound: usize) -> Option<Self> {
        DEPTH.with(|depth| {
            if depth.get() >= bound {
                None
            } else {
                depth.set(depth.get() + 1);
                Some(DepthGuard { _private: () })
            }
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Guarded frames active on this thread.
pub fn current_depth() -> usize {
    DEPTH.with(|depth| depth.get())
}

/// Placeholder returned instead of a description past the bound.
pub fn placeholder(label: &str, identity: impl Hash) -> String {
    let mut hasher = DefaultHasher::new();
    identity.hash(&mut hasher);
    format!("{}@{:08x}[recursion prevented]", label, hasher.finish() as u32)
}

/// Runs `describe` one level deeper, or returns a placeholder past `bound`.
pub fn guarded<F>(bound: usize, label: &str, identity: impl Hash, describe: F) -> String
where
    F: FnOnce() -> String,
{
    match DepthGuard::enter(bound) {
        Some(_guard) => describe(),
        None => {
            let text = placeholder(label, identity);
            warn!("Recursion bound {} hit while describing {}", bound, truncate(&text, 64));
            text
        }
    }
}

/// `Display` helper: writes a guarded description into a formatter.
pub fn write_guarded<F>(
    f: &mut fmt::Formatter<'_>,
    bound: usize,
    label: &str,
    identity: impl Hash,
    describe: F,
) -> fmt::Result
where
    F: FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
{
    match DepthGuard::enter(bound) {
        Some(_guard) => describe(f),
        None => {
            let text = placeholder(label, identity);
            warn!("Recursion bound {} hit while describing {}", bound, truncate(&text, 64));
            f.write_str(&text)
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
