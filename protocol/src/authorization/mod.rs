//! # Authorization Service
//!
//! Ties the other modules together. Makers register an order's terms and
//! the opening of its commitment; takers ask to fill it. A fill that meets
//! the hidden thresholds comes back as a rebuilt order whose extension
//! carries a fresh proof, signed for the router.
//!
//! - `registry.rs`: in-memory terms/secrets store, injectable per service
//! - `request.rs`: typed, validated request bodies
//! - `service.rs`: `AuthorizationService` and the fill state machine

pub mod registry;
pub mod request;
pub mod service;

pub use registry::{OrderRegistry, Registration, RegistryError, ResolvedOrder};
pub use request::{FillRequest, RegisterOrderRequest, ValidFill};
pub use service::{AuthorizationError, AuthorizationService, ErrorBody, FillAuthorization, FillStage};
