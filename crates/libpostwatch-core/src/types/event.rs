use std::fmt;

use super::ids::Did;

/// Kind of record mutation carried by a repository operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    /// Parse the wire representation (`create`, `update`, `delete`)
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Action::Create),
            "update" => Some(Action::Update),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single record mutation inside a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub action: Action,
    /// `<collection>/<rkey>`
    pub path: String,
    /// Hex-encoded CID of the new record (absent for deletes)
    pub cid: Option<String>,
}

impl Operation {
    pub fn new(action: Action, path: impl Into<String>) -> Self {
        Self {
            action,
            path: path.into(),
            cid: None,
        }
    }

    /// Leading path segment, i.e. the record collection NSID
    pub fn collection(&self) -> &str {
        self.path.split('/').next().unwrap_or_default()
    }

    /// Trailing path segment, i.e. the record key
    pub fn rkey(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }
}

/// One decoded `#commit` message from the firehose
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    /// Firehose sequence number
    pub seq: i64,
    /// Repository that produced the commit
    pub repo: Did,
    pub rev: Option<String>,
    pub time: Option<String>,
    pub ops: Vec<Operation>,
    /// Set by the relay when the commit was too large to inline its blocks
    pub too_big: bool,
}

/// A created record that passed the filter; the unit handed to a notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPost {
    pub repo: Did,
    pub path: String,
    pub seq: i64,
}

impl MatchedPost {
    pub fn new(event: &CommitEvent, op: &Operation) -> Self {
        Self {
            repo: event.repo.clone(),
            path: op.path.clone(),
            seq: event.seq,
        }
    }

    pub fn rkey(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Link to the post on the Bluesky web client
    pub fn web_url(&self) -> String {
        format!("https://bsky.app/profile/{}/post/{}", self.repo, self.rkey())
    }
}
