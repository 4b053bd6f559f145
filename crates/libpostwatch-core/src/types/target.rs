use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::ids::{Did, Handle};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("target set must contain at least one identity")]
pub struct EmptyTargetSet;

/// Immutable, non-empty set of repositories being watched
#[derive(Debug, Clone)]
pub struct TargetSet {
    dids: HashSet<Did>,
    /// Handle each DID was resolved from, for log output
    handles: HashMap<Did, Handle>,
}

impl TargetSet {
    /// Build from resolved `(handle, did)` pairs
    pub fn from_resolved<I>(resolved: I) -> Result<Self, EmptyTargetSet>
    where
        I: IntoIterator<Item = (Handle, Did)>,
    {
        let mut dids = HashSet::new();
        let mut handles = HashMap::new();
        for (handle, did) in resolved {
            dids.insert(did.clone());
            handles.entry(did).or_insert(handle);
        }
        if dids.is_empty() {
            return Err(EmptyTargetSet);
        }
        Ok(Self { dids, handles })
    }

    /// Build directly from DIDs, without handle labels
    pub fn from_dids<I>(dids: I) -> Result<Self, EmptyTargetSet>
    where
        I: IntoIterator<Item = Did>,
    {
        let dids: HashSet<Did> = dids.into_iter().collect();
        if dids.is_empty() {
            return Err(EmptyTargetSet);
        }
        Ok(Self {
            dids,
            handles: HashMap::new(),
        })
    }

    pub fn contains(&self, did: &Did) -> bool {
        self.dids.contains(did)
    }

    pub fn len(&self) -> usize {
        self.dids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dids.is_empty()
    }

    /// Handle the DID was resolved from, if known
    pub fn handle_for(&self, did: &Did) -> Option<&Handle> {
        self.handles.get(did)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Did> {
        self.dids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn did(s: &str) -> Did {
        Did::parse(s).unwrap()
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(TargetSet::from_dids(Vec::new()).unwrap_err(), EmptyTargetSet);
        assert!(TargetSet::from_resolved(Vec::new()).is_err());
    }

    #[test]
    fn test_handles_sharing_a_did() {
        let set = TargetSet::from_resolved(vec![
            (Handle::parse("alice.example.com").unwrap(), did("did:plc:abc")),
            (Handle::parse("alias.example.com").unwrap(), did("did:plc:abc")),
        ])
        .unwrap();

        assert_eq!(set.len(), 1);
        assert!(set.contains(&did("did:plc:abc")));
        assert_eq!(
            set.handle_for(&did("did:plc:abc")).map(Handle::as_str),
            Some("alice.example.com")
        );
    }

    #[test]
    fn test_contains() {
        let set = TargetSet::from_dids([did("did:plc:abc")]).unwrap();
        assert!(set.contains(&did("did:plc:abc")));
        assert!(!set.contains(&did("did:plc:other")));
        assert!(set.handle_for(&did("did:plc:abc")).is_none());
    }
}
