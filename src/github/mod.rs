pub mod client;
pub mod identity;
pub mod types;

pub use client::{GitHost, GitHubApi};
pub use identity::{HttpIdentityProvider, IdentityProvider};
pub use types::*;
