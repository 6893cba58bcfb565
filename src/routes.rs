//! Canonical API paths.
//!
//! Pure path reversal for one API root. The response cache files entries under the
//! request path, so invalidation must produce byte-identical strings to what the
//! router sees. Owner names, dataset slugs and submission set names are assumed to
//! be path-safe (they are slugs).

use std::fmt::Display;

/// Generic submission set name under which every set is also reachable.
pub const GENERIC_SUBMISSION_SET: &str = "submissions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routes {
    root: String,
}

impl Routes {
    /// `root` is the mount point of the API, e.g. `/api/v2`. A trailing slash is dropped.
    pub fn new(root: impl Into<String>) -> Self {
        let mut root = root.into();
        while root.ends_with('/') {
            root.pop();
        }
        Self { root }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn user_detail(&self, owner: &str) -> String {
        format!("{}/{owner}", self.root)
    }

    pub fn dataset_list(&self, owner: &str) -> String {
        format!("{}/{owner}/datasets", self.root)
    }

    pub fn dataset_detail(&self, owner: &str, dataset: &str) -> String {
        format!("{}/{owner}/datasets/{dataset}", self.root)
    }

    pub fn action_list(&self, owner: &str, dataset: &str) -> String {
        format!("{}/actions", self.dataset_detail(owner, dataset))
    }

    pub fn place_list(&self, owner: &str, dataset: &str) -> String {
        format!("{}/places", self.dataset_detail(owner, dataset))
    }

    pub fn place_detail(&self, owner: &str, dataset: &str, place: impl Display) -> String {
        format!("{}/{place}", self.place_list(owner, dataset))
    }

    pub fn place_attachments(&self, owner: &str, dataset: &str, place: impl Display) -> String {
        format!("{}/attachments", self.place_detail(owner, dataset, place))
    }

    pub fn submission_list(
        &self,
        owner: &str,
        dataset: &str,
        place: impl Display,
        set: &str,
    ) -> String {
        format!("{}/{set}", self.place_detail(owner, dataset, place))
    }

    pub fn submission_detail(
        &self,
        owner: &str,
        dataset: &str,
        place: impl Display,
        set: &str,
        submission: impl Display,
    ) -> String {
        format!(
            "{}/{submission}",
            self.submission_list(owner, dataset, place, set)
        )
    }

    pub fn submission_attachments(
        &self,
        owner: &str,
        dataset: &str,
        place: impl Display,
        set: &str,
        submission: impl Display,
    ) -> String {
        format!(
            "{}/attachments",
            self.submission_detail(owner, dataset, place, set, submission)
        )
    }

    /// All submissions of one set name across a dataset.
    pub fn dataset_submission_list(&self, owner: &str, dataset: &str, set: &str) -> String {
        format!("{}/{set}", self.dataset_detail(owner, dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let routes = Routes::new("/api/v2/");
        assert_eq!(routes.root(), "/api/v2");
        assert_eq!(routes.dataset_list("alice"), "/api/v2/alice/datasets");
    }

    #[test]
    fn nested_paths_share_their_parents() {
        let routes = Routes::new("/api/v2");
        assert_eq!(
            routes.place_detail("alice", "trees", 7),
            "/api/v2/alice/datasets/trees/places/7"
        );
        assert_eq!(
            routes.submission_detail("alice", "trees", 7, "comments", 12),
            "/api/v2/alice/datasets/trees/places/7/comments/12"
        );
        assert_eq!(
            routes.dataset_submission_list("alice", "trees", GENERIC_SUBMISSION_SET),
            "/api/v2/alice/datasets/trees/submissions"
        );
        assert_eq!(
            routes.action_list("alice", "trees"),
            "/api/v2/alice/datasets/trees/actions"
        );
    }
}
