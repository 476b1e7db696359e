//! Cooperative utilities: event emitter, backoff timer, overflow queue and
//! the scoped task group used by the switch lifecycle.

pub mod backoff;
pub mod events;
pub mod queue;
pub mod tasks;
