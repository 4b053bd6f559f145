//! Handle resolution

use std::collections::HashSet;

use libpostwatch_core::{Did, Handle, TargetSet};
use serde::Deserialize;

use crate::error::{ResolveError, XrpcError};
use crate::xrpc::XrpcClient;

const RESOLVE_HANDLE: &str = "com.atproto.identity.resolveHandle";

/// Maps a handle to the DID it currently points at
pub trait ResolveHandle: Send + Sync {
    fn resolve(&self, handle: &Handle) -> Result<Did, ResolveError>;
}

#[derive(Deserialize)]
struct ResolveHandleOutput {
    did: String,
}

/// Resolves handles through `com.atproto.identity.resolveHandle`
pub struct XrpcIdentityResolver {
    client: XrpcClient,
}

impl XrpcIdentityResolver {
    pub fn new(client: XrpcClient) -> Self {
        Self { client }
    }
}

impl ResolveHandle for XrpcIdentityResolver {
    fn resolve(&self, handle: &Handle) -> Result<Did, ResolveError> {
        let output: ResolveHandleOutput = self
            .client
            .query(RESOLVE_HANDLE, &[("handle", handle.as_str())], &[])
            .map_err(|e| match e {
                XrpcError::Status {
                    status: 400 | 404,
                    ref error,
                    ref message,
                    ..
                } => ResolveError::NotFound {
                    handle: handle.clone(),
                    reason: message
                        .clone()
                        .or_else(|| error.clone())
                        .unwrap_or_else(|| "unknown handle".to_string()),
                },
                other => ResolveError::Unreachable {
                    handle: handle.clone(),
                    source: other,
                },
            })?;

        Did::parse(&output.did).map_err(|source| ResolveError::InvalidDid {
            handle: handle.clone(),
            source,
        })
    }
}

/// Resolve every distinct handle once and build the target set
///
/// The first failure aborts construction; there is no partial result.
pub fn resolve_target_set<R>(resolver: &R, handles: &[Handle]) -> Result<TargetSet, ResolveError>
where
    R: ResolveHandle + ?Sized,
{
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(handles.len());
    for handle in handles {
        if !seen.insert(handle) {
            continue;
        }
        let did = resolver.resolve(handle)?;
        resolved.push((handle.clone(), did));
    }
    TargetSet::from_resolved(resolved).map_err(|_| ResolveError::NoHandles)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::test_server::serve;

    struct FakeResolver {
        known: HashMap<&'static str, &'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeResolver {
        fn new(known: &[(&'static str, &'static str)]) -> Self {
            Self {
                known: known.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ResolveHandle for FakeResolver {
        fn resolve(&self, handle: &Handle) -> Result<Did, ResolveError> {
            self.calls.lock().unwrap().push(handle.to_string());
            match self.known.get(handle.as_str()) {
                Some(did) => Ok(Did::parse(did).unwrap()),
                None => Err(ResolveError::NotFound {
                    handle: handle.clone(),
                    reason: "Unable to resolve handle".to_string(),
                }),
            }
        }
    }

    fn handles(names: &[&str]) -> Vec<Handle> {
        names.iter().map(|h| Handle::parse(h).unwrap()).collect()
    }

    #[test]
    fn test_resolves_each_handle_once() {
        let resolver = FakeResolver::new(&[
            ("alice.example.com", "did:plc:alice"),
            ("bob.example.com", "did:plc:bob"),
        ]);
        let set = resolve_target_set(
            &resolver,
            &handles(&["alice.example.com", "bob.example.com", "@Alice.example.com"]),
        )
        .unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.contains(&Did::parse("did:plc:alice").unwrap()));
        assert_eq!(resolver.calls(), ["alice.example.com", "bob.example.com"]);
    }

    #[test]
    fn test_one_failure_aborts() {
        let resolver = FakeResolver::new(&[("alice.example.com", "did:plc:alice")]);
        let err = resolve_target_set(
            &resolver,
            &handles(&["ghost.example.com", "alice.example.com"]),
        )
        .unwrap_err();

        assert!(matches!(err, ResolveError::NotFound { .. }));
        assert_eq!(err.handle().map(Handle::as_str), Some("ghost.example.com"));
        assert_eq!(resolver.calls(), ["ghost.example.com"]);
    }

    #[test]
    fn test_no_handles() {
        let resolver = FakeResolver::new(&[]);
        assert!(matches!(
            resolve_target_set(&resolver, &[]),
            Err(ResolveError::NoHandles)
        ));
    }

    fn xrpc_resolver(url: &str) -> XrpcIdentityResolver {
        XrpcIdentityResolver::new(XrpcClient::new(url))
    }

    fn alice() -> Handle {
        Handle::parse("alice.example.com").unwrap()
    }

    #[test]
    fn test_xrpc_resolves_did() {
        let (url, requests) = serve(vec![(200, r#"{"did":"did:plc:alice"}"#)]);

        let did = xrpc_resolver(&url).resolve(&alice()).unwrap();

        assert_eq!(did.as_str(), "did:plc:alice");
        let requests = requests.lock().unwrap();
        assert_eq!(requests[0].nsid(), RESOLVE_HANDLE);
        assert!(requests[0].line.contains("handle=alice.example.com"));
    }

    #[test]
    fn test_xrpc_unknown_handle_is_not_found() {
        for status in [400, 404] {
            let (url, _requests) = serve(vec![(
                status,
                r#"{"error":"InvalidRequest","message":"Unable to resolve handle"}"#,
            )]);

            match xrpc_resolver(&url).resolve(&alice()) {
                Err(ResolveError::NotFound { handle, reason }) => {
                    assert_eq!(handle, alice());
                    assert_eq!(reason, "Unable to resolve handle");
                }
                other => panic!("HTTP {status}: expected NotFound, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_xrpc_server_error_is_unreachable() {
        let (url, _requests) = serve(vec![(502, r#"{"error":"UpstreamFailure"}"#)]);

        match xrpc_resolver(&url).resolve(&alice()) {
            Err(ResolveError::Unreachable { source, .. }) => {
                assert_eq!(source.status(), Some(502));
                assert_eq!(source.error_name(), Some("UpstreamFailure"));
            }
            other => panic!("expected Unreachable, got {other:?}"),
        }
    }

    #[test]
    fn test_xrpc_malformed_did_is_invalid() {
        let (url, _requests) = serve(vec![(200, r#"{"did":"alice"}"#)]);

        assert!(matches!(
            xrpc_resolver(&url).resolve(&alice()),
            Err(ResolveError::InvalidDid { .. })
        ));
    }
}
