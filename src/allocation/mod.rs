// src/allocation/mod.rs
//! Reservations and allocations
//!
//! A request first becomes a [`ResourceReservation`] (intent), which is
//! placed on a resource and confirmed, then activated into a
//! [`ResourceAllocation`] (actual consumption). See [`coordinator`] for the
//! transitions.

pub mod coordinator;
pub mod model;

pub use model::{
    calculate_efficiency, AllocationId, AllocationStatus, RequestOptions, ReservationId,
    ReservationStatus, ResourceAllocation, ResourceReservation,
};
