//! Resource-booking conflict engine.
//!
//! Guarantees a resource is never double-booked: every live reservation of a
//! resource occupies a half-open interval disjoint from all the others, even
//! under concurrent submission. An approval workflow sits on top, including
//! override approvals that displace conflicting bookings atomically.

pub mod config;
pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;

pub use engine::{Engine, EngineError, EngineSettings};
pub use model::{Interval, Ms, Reservation, ResourcePolicy, Status, TransitionMeta};
