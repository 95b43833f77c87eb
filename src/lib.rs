//! rebasebot - keeps a downstream fork rebased onto its upstream
//!
//! The bot fetches three configured remotes (source, dest, rebase), replays
//! the downstream carry commits onto the source tip, runs user-provided
//! lifecycle hooks along the way, force-pushes the result to the
//! intermediate rebase repository, and opens or updates the pull request
//! into dest.

pub mod auth;
pub mod bot;
pub mod error;
pub mod git;
pub mod hooks;
pub mod notify;
pub mod platform;
pub mod pr;
pub mod rebase;
pub mod remote;
pub mod types;
