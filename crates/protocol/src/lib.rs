//! Request vocabulary for gatehouse.
//!
//! This crate holds the small value types that both the runtime and the client
//! facade speak: HTTP methods, browser profiles, header lists, and the URL and
//! query-string helpers used to turn an endpoint into a request target.
//!
//! Types here carry no I/O and no async; the runtime builds on them.

pub mod endpoint;
pub mod headers;
pub mod method;
pub mod profile;

pub use endpoint::{QueryValue, build_query_string, join_endpoint, normalize_base_url};
pub use headers::Headers;
pub use method::{Method, UnsupportedMethod};
pub use profile::BrowserProfile;
