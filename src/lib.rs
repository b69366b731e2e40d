//! Process health reporting: a `/healthz` reporter backed by procfs
//! collectors, and a prober that polls such an endpoint with retry.

pub mod collectors;
pub mod config;
pub mod http;
pub mod metrics;
pub mod probe;
pub mod state;
