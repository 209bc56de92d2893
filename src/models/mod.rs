//! Core data models for the S3-compatible object storage service.
//!
//! These entities represent the logical structure of buckets, objects and
//! their ancillary configuration. Everything here is plain `serde` data —
//! there is no database row mapping, since the store persists state as
//! files under the data root rather than in a database.

pub mod bucket;
pub mod cors;
pub mod event;
pub mod multipart;
pub mod object;
pub mod website;
