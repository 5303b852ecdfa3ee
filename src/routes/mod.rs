//! Router Module Index
//!
//! Groups the explicitly routed endpoints. None of them pass through the
//! access gate: the gate only wraps the page fallback assembled in
//! `create_router`.

/// Routes accessible to any client (liveness).
pub mod public;

/// JSON endpoints that report access decisions for the caller's cookie.
pub mod access;
