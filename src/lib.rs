//! Provider routing and credential proxying for a research assistant front-end.
//!
//! ```text
//! browser ──(local)──────────────────────────────► provider (user's key)
//! browser ──(proxy: access token)──► gateway ─────► provider (server key)
//! ```
//!
//! [`registry`] decides where a call goes, [`signature`] authorizes proxied
//! calls without shipping a secret, [`gateway`] forwards them, and
//! [`normalize`] turns every failure into one displayable message.

pub mod balancer;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod signature;

pub use error::{ProxyError, UnsupportedProvider};
pub use normalize::{normalize, NormalizedError, RawError};
