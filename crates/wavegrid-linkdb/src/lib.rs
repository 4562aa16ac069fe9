//! wavegrid-linkdb — the Link Database.
//!
//! The only shared mutable store between controllers. Holds the physical
//! topology (POPs, routers, interfaces, optical links), the spectrum slot
//! occupancy per link, the interface ownership registry, the virtual
//! operator registry, and durable connection records.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns
//! (in-memory backend for tests). Spectrum allocation runs first-fit inside
//! a single write transaction, so the scan-and-commit over every link of a
//! path is atomic: two racing allocations can never interleave into an
//! overlap.
//!
//! The crate ships three faces:
//! - [`LinkDb`] — the embedded store,
//! - [`service::build_router`] — the axum REST service over it,
//! - [`client::LinkDbClient`] — the HTTP client used by the other services.

pub mod allocator;
pub mod client;
pub mod error;
pub mod graph;
pub mod service;
pub mod store;
pub mod tables;
pub mod testing;

pub use allocator::first_fit;
pub use client::LinkDbClient;
pub use error::{LinkDbError, LinkDbResult};
pub use store::LinkDb;
