//! Native stack headroom for the recursive passes.
//!
//! Resolving and evaluating recurse once per nested node and several times
//! per interpreted call, so deep programs would otherwise exhaust small thread
//! stacks (test threads get 2 MiB) before `max_call_depth` is reached.

/// Grow the stack when less than this much remains.
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated stack segment.
const STACK_PER_RECURSION: usize = 2 * 1024 * 1024;

/// Runs `f`, first moving to a fresh stack segment if the current one is
/// nearly exhausted.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
