pub mod git;
mod github;
mod hooks;
mod releases;
pub mod response;
mod router;

pub use git::git_router;
pub use router::{AppState, create_router};
