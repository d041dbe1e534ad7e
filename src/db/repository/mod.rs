//! Repository layer — entity-scoped database operations.

mod consultation;
mod patient;
mod prescription;

pub use consultation::*;
pub use patient::*;
pub use prescription::*;
