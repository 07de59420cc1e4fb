// Core domain layer
pub mod cache;
pub mod decision;
pub mod interfaces;
pub mod models;

pub use cache::*;
pub use decision::*;
pub use interfaces::*;
pub use models::*;
