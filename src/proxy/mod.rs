//! Offline proxy between callers and the network.
//!
//! Requests are classified by an ordered route table and answered with one of:
//! - network with a synthetic offline response (API)
//! - cache first with background refresh (images, same-origin static files)
//! - network first with cache fallback (cross-origin and everything else)
//!
//! Cache namespaces are versioned; activating a new version purges the old ones.

mod routes;
mod worker;

pub use routes::{RequestClass, Route, RouteMatch, Router, Strategy};
pub use worker::{FetchOutcome, LifecycleState, OfflineProxy, ProxyResponse, ResponseSource, OFFLINE_MESSAGE};
