//! Cross-request cookie jar with domain-scoped matching.
//!
//! An `RwLock`-guarded store wrapper, hand-rolled rather than delegated to
//! the `cookie_store`/`cookie` crates, since the expire-before-set,
//! escape-on-receive, and filter semantics here need more direct control
//! than the off-the-shelf crates expose.

mod filters;
mod jar;
mod store_io;

pub use jar::{Cookie, CookieJar};
pub use store_io::{load, save};
