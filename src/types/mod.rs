pub mod keys;
mod models;

pub use models::*;
