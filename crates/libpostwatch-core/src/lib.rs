pub mod types;
pub mod frame;
pub mod filter;
pub mod config;
pub mod error;

pub use error::{ConfigError, DecodeError};
pub use types::{Action, CommitEvent, Did, Handle, MatchedPost, Operation, TargetSet};
pub use types::{EmptyTargetSet, IdParseError};
pub use frame::{decode_frame, frame_seq, Decoded};
pub use filter::EventFilter;
pub use config::{ChatCredentials, Config};

/// NSID of the post record collection
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Default relay endpoint for `com.atproto.sync.subscribeRepos`
pub const DEFAULT_FIREHOSE_URL: &str = "wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos";

/// Default public AppView used for handle resolution and profile lookups
pub const DEFAULT_APPVIEW_URL: &str = "https://public.api.bsky.app";

/// Default PDS used to log in for chat delivery
pub const DEFAULT_PDS_URL: &str = "https://bsky.social";

/// Default fixed delay between reconnect attempts, in seconds
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 10;

/// Default silence on an open connection before it is treated as dead, in seconds
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;
