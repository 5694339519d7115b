//! Foundation types for depot.
//!
//! This crate provides the value types exchanged between the data store
//! manager, its collaborators, and the blob store layer. Every other depot
//! crate depends on `depot-types`.
//!
//! # Key Types
//!
//! - [`StoreKey`] -- Case-insensitive registry key derived from a store name
//! - [`StoreConfiguration`] -- Named, typed, attributed configuration of a data store
//! - [`BlobHeaders`] -- Out-of-band hints attached to a blob write

pub mod config;
pub mod error;
pub mod headers;
pub mod name;

pub use config::StoreConfiguration;
pub use error::TypeError;
pub use headers::{BlobHeaders, BLOB_NAME_HEADER, CREATED_BY_HEADER, TEMPORARY_BLOB_HEADER};
pub use name::{validate_store_name, StoreKey, MAX_STORE_NAME_LEN};
