//! Infrastructure layer
//!
//! Storage seams and their implementations. The engine in [`crate::core`]
//! only talks to the traits in [`store`].

pub mod filesystem;
pub mod memory;
pub mod repo;
pub mod store;
