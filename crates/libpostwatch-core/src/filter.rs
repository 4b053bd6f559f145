//! Commit filtering against the watched repositories

use crate::types::{Action, CommitEvent, MatchedPost, Operation, TargetSet};
use crate::POST_COLLECTION;

/// Selects record creations in one collection from watched repositories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    collection: String,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new(POST_COLLECTION)
    }
}

impl EventFilter {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Every operation in `event` that should produce a notification
    ///
    /// Empty unless the commit's repository is in `targets`. The collection
    /// must equal the leading path segment exactly.
    pub fn matching_ops<'a>(
        &'a self,
        event: &'a CommitEvent,
        targets: &TargetSet,
    ) -> impl Iterator<Item = &'a Operation> + 'a {
        let watched = targets.contains(&event.repo);
        event
            .ops
            .iter()
            .filter(move |op| watched && op.action == Action::Create && op.collection() == self.collection)
    }

    pub fn matches(&self, event: &CommitEvent, targets: &TargetSet) -> bool {
        self.matching_ops(event, targets).next().is_some()
    }

    /// Matching operations packaged for delivery, in commit order
    pub fn matched_posts(&self, event: &CommitEvent, targets: &TargetSet) -> Vec<MatchedPost> {
        self.matching_ops(event, targets)
            .map(|op| MatchedPost::new(event, op))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Did;

    fn did(s: &str) -> Did {
        Did::parse(s).unwrap()
    }

    fn targets() -> TargetSet {
        TargetSet::from_dids([did("did:plc:abc")]).unwrap()
    }

    fn commit(repo: &str, ops: Vec<Operation>) -> CommitEvent {
        CommitEvent {
            seq: 1,
            repo: did(repo),
            rev: None,
            time: None,
            ops,
            too_big: false,
        }
    }

    #[test]
    fn test_truth_table() {
        let filter = EventFilter::default();
        let targets = targets();

        for watched in [true, false] {
            for create in [true, false] {
                for post_path in [true, false] {
                    let repo = if watched { "did:plc:abc" } else { "did:plc:other" };
                    let action = if create { Action::Create } else { Action::Update };
                    let path = if post_path {
                        "app.bsky.feed.post/xyz"
                    } else {
                        "app.bsky.feed.like/xyz"
                    };
                    let event = commit(repo, vec![Operation::new(action, path)]);

                    assert_eq!(
                        filter.matches(&event, &targets),
                        watched && create && post_path,
                        "watched={watched} create={create} post_path={post_path}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_one_match_per_operation() {
        let filter = EventFilter::default();
        let event = commit(
            "did:plc:abc",
            vec![
                Operation::new(Action::Create, "app.bsky.feed.post/one"),
                Operation::new(Action::Create, "app.bsky.feed.like/skip"),
                Operation::new(Action::Delete, "app.bsky.feed.post/gone"),
                Operation::new(Action::Create, "app.bsky.feed.post/two"),
            ],
        );

        let posts = filter.matched_posts(&event, &targets());
        let paths: Vec<_> = posts.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, ["app.bsky.feed.post/one", "app.bsky.feed.post/two"]);
    }

    #[test]
    fn test_collection_must_match_whole_segment() {
        let filter = EventFilter::default();
        let event = commit(
            "did:plc:abc",
            vec![Operation::new(Action::Create, "app.bsky.feed.postgate/xyz")],
        );
        assert!(!filter.matches(&event, &targets()));
    }

    #[test]
    fn test_custom_collection() {
        let filter = EventFilter::new("app.bsky.feed.repost");
        let event = commit(
            "did:plc:abc",
            vec![Operation::new(Action::Create, "app.bsky.feed.repost/r1")],
        );
        assert!(filter.matches(&event, &targets()));
        assert!(!EventFilter::default().matches(&event, &targets()));
    }

    #[test]
    fn test_empty_commit() {
        let filter = EventFilter::default();
        assert!(!filter.matches(&commit("did:plc:abc", vec![]), &targets()));
    }
}
