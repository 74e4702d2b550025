#![deny(missing_docs)]

//! # campus-core — Foundational Types for the Campus Portal
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies, only `serde`, `thiserror`
//! and `uuid` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** A [`PrincipalId`] cannot be
//!    passed where a [`TransactionId`] is expected.
//!
//! 2. **One closed [`Role`] enum.** Students, members, volunteers and admins
//!    share a single auth path parameterized by role; there are no parallel
//!    per-role implementations to drift apart.
//!
//! 3. **Validated at construction.** [`Email`] normalizes and validates once,
//!    so downstream code never re-checks format or case.
//!
//! 4. **[`ValidationError`] is field-specific.** Input failures name the
//!    offending field so callers can show them next to the form input.

pub mod error;
pub mod identity;
pub mod role;

pub use error::ValidationError;
pub use identity::{ArtifactId, Email, PrincipalId, ResetTokenId, TransactionId};
pub use role::Role;

/// Minimum accepted length, in characters, of a principal's secret.
pub const MIN_SECRET_LENGTH: usize = 6;
