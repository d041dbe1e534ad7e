pub mod consultation;
pub mod enums;
pub mod filters;
pub mod patient;
pub mod prescription;

pub use consultation::*;
pub use filters::*;
pub use patient::*;
pub use prescription::*;
