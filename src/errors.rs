//! Error taxonomy.
//!
//! Errors are typed kinds rather than free-form strings so that embedders can
//! match on them. Reply-time failures (`DeepRecursion`, `RepliesNotSorted`,
//! `NoDefaultTopic`, `NoTriggerMatched`, `NoReplyFound`) surface from
//! [`RiveScript::reply`](crate::RiveScript::reply); the rest surface from the
//! loading and configuration APIs. Tag-processing failures inside a reply do
//! not appear here at all: they degrade to an inline bracketed string so a
//! partial reply is still delivered.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All the ways a RiveScript bot can fail.
#[derive(Debug, Error)]
pub enum Error {
    /// A redirect or macro loop exceeded the configured recursion depth.
    #[error("deep recursion detected")]
    DeepRecursion,

    /// `reply()` was invoked before `sort_replies()`.
    #[error("replies not sorted; call sort_replies() after loading")]
    RepliesNotSorted,

    /// The default topic `random` is missing from the brain.
    #[error("no default topic 'random' was found")]
    NoDefaultTopic,

    /// The user's message matched nothing in their current topic.
    #[error("no trigger matched")]
    NoTriggerMatched,

    /// A trigger matched but every selection step produced an empty reply.
    #[error("the trigger matched but yielded no reply")]
    NoReplyFound,

    /// Sorting found nothing to sort.
    #[error("no source loaded; did you load any RiveScript code?")]
    NoSourceLoaded,

    /// Fatal syntax error from the parser.
    #[error("{reason} at {file} line {line}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },

    /// A directory load matched no files with an accepted extension.
    #[error("no RiveScript files found in {0}")]
    NoFilesFound(String),

    /// The named user has no session data.
    #[error("no data for username {0:?}")]
    NoSuchUser(String),

    /// The named variable is not set.
    #[error("variable {0:?} is not set")]
    NoSuchVariable(String),

    /// Thaw was requested for a user with no frozen session.
    #[error("no frozen data for username {0:?}")]
    NotFrozen(String),

    /// `current_user()` was called outside of a reply context.
    #[error("not currently replying to a user")]
    NotReplying,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
