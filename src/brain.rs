//! The reply engine.
//!
//! This module is the operational core of the bot, split into focused
//! submodules:
//!
//! - `inheritance.rs`: walks the topic graph (includes + inherits) and
//!   collects the triggers visible from a topic, tagging inherited ones
//!   with a synthetic `{inherits=N}` prefix.
//! - `sorting.rs`: ranks those triggers into the per-topic match indices.
//!   Match behavior depends entirely on this order, so it is the
//!   correctness hotspot of the whole crate.
//! - `regexp.rs`: compiles one trigger pattern into an anchored regular
//!   expression, interpolating arrays, bot/user variables and history.
//! - `reply.rs`: the match engine: normalization, the `%Previous`
//!   two-turn pass, conditionals, weighted selection and redirects.
//! - `tags.rs`: message normalization, substitutions and the reply tag
//!   processor (`<star>`, `{random}`, `<set>`, `<call>`, ...).
//!
//! At a high level a reply is a pipeline:
//!
//! ```text
//! message ── normalize ──┬─ %Previous pass (two-turn context)
//!                        └─ main pass over the sorted index
//!                                │
//!                     redirect / conditions / weighted pick
//!                                │
//!                          tag processing
//!                                │
//!                          history append
//! ```
//!
//! Every recursive path (redirects, inline `{@...}`, tag loops, the topic
//! walk) is bounded by the single `depth` knob; exceeding it surfaces as
//! [`Error::DeepRecursion`](crate::Error::DeepRecursion).

#[path = "brain/inheritance.rs"]
mod inheritance;
#[path = "brain/regexp.rs"]
mod regexp;
#[path = "brain/reply.rs"]
mod reply;
#[path = "brain/sorting.rs"]
mod sorting;
#[path = "brain/tags.rs"]
mod tags;
