pub mod ids;
pub mod event;
pub mod target;

pub use ids::{Did, Handle, IdParseError};
pub use event::{Action, CommitEvent, MatchedPost, Operation};
pub use target::{EmptyTargetSet, TargetSet};
