//! HTTP surface for Crucible.
//!
//! A thin axum layer over [`crucible_service::Service`]: routing, header
//! protocol, body limits, and the mapping from service errors to status
//! codes. All semantics live below this crate.
//!
//! # Endpoints
//!
//! - `POST /compile/{language}` — source in, module bytes out, hashes and
//!   contract verdict in `X-*` headers
//! - `POST /validate` — module bytes in, JSON report out
//! - `POST /run/{ref}` — input in (or `?input=<ref>`), output bytes out
//! - `GET|HEAD /blob/{ref}` — stored bytes by hash or alias
//! - `GET /aliases`, `GET|PUT|DELETE /alias/{name}` — alias registry
//! - `GET /events`, `GET /stats`, `GET /languages`, `GET /health`

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use router::build_router;
pub use server::CrucibleServer;
