//! Contains the building blocks of the watchface core.
//!
//! `lifecycle` holds the pure transition function deciding what every
//! stimulus does; `scheduler` owns the foreground timer and the ambient alarm;
//! `subscriptions` tracks system event registrations and the application's
//! handler lists. The engine drives all three from a single loop.

pub mod lifecycle;
pub mod scheduler;
pub mod subscriptions;
