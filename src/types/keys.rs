//! Label and annotation keys recorded on orchestrator deployments.

/// Labels selecting every deployment built from a GitHub repository.
pub const LABEL_GIT_OWNER: &str = "slipway.io/git-owner";
pub const LABEL_GIT_REPO: &str = "slipway.io/git-repo";

/// Webhook association annotations, written alongside the labels.
pub const ANNOTATION_GITHUB_USER: &str = "slipway.io/github-user";
pub const ANNOTATION_HOOK_ID: &str = "slipway.io/hook-id";

/// Build configuration annotations read by the dispatcher.
pub const ANNOTATION_GIT_BRANCH: &str = "slipway.io/git-branch";
pub const ANNOTATION_CUSTOMER: &str = "slipway.io/customer";
pub const ANNOTATION_ORGANIZATION: &str = "slipway.io/organization";

/// Build trigger annotations, written as one merge-patch per push.
pub const ANNOTATION_BUILD: &str = "slipway.io/build";
pub const ANNOTATION_BUILD_REVISION: &str = "slipway.io/build-revision";
pub const ANNOTATION_BUILD_SOURCE: &str = "slipway.io/build-source";
pub const ANNOTATION_GIT_REMOTE: &str = "slipway.io/git-remote";
pub const ANNOTATION_GIT_REPOSITORY: &str = "slipway.io/git-repository";
pub const ANNOTATION_GIT_REVISION: &str = "slipway.io/git-revision";
pub const ANNOTATION_GIT_COMPARE: &str = "slipway.io/git-compare";
pub const ANNOTATION_AUTH_TOKEN: &str = "slipway.io/auth-token";
