//! jsonmock - a mock REST API server backed by a single JSON document.
//!
//! The server loads one JSON file whose top-level keys are collection names
//! mapped to arrays of records, and exposes generic CRUD over them. On top of
//! the plain CRUD surface it provides:
//!
//! - **URL rewriting**: ordered pattern rules (`/api/*` -> `/$1`,
//!   `/blog/:resource/:id/show` -> `/:resource/:id`), first match wins
//! - **Automatic timestamping**: `createdAt`/`updatedAt` forced onto mutation
//!   bodies as epoch milliseconds
//! - **Pagination translation**: friendly `pageNumber`/`pageSize` parameters
//!   mapped to the router's native `_page`/`_limit`
//! - **Paginated envelopes**: list responses reshaped into
//!   `{totalItems, totalPages, pageItems}` from the `X-Total-Count` signal
//! - **File uploads**: multipart ingestion into a content directory served
//!   back under `/cdn`
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jsonmock::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     jsonmock::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # HTTP Surface
//!
//! - `GET /health` - liveness probe
//! - `GET /metrics` - Prometheus metrics
//! - `GET /echo` - echoes the parsed query string
//! - `GET /db` - the full document
//! - `GET /{collection}` - list records (paginated via `pageNumber`/`pageSize`)
//! - `GET /{collection}/{id}` - fetch one record
//! - `POST /{collection}` - create a record (JSON or multipart)
//! - `PUT /{collection}/{id}` - replace a record
//! - `PATCH /{collection}/{id}` - merge fields into a record
//! - `DELETE /{collection}/{id}` - delete a record
//! - `POST /{collection}/uploads` - upload files
//! - `GET /cdn/{file}` - serve uploaded files

pub mod config;
pub mod error;
pub mod middleware;
pub mod paginate;
pub mod rewrite;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;

pub use config::{EnvelopeMode, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::AppState;
pub use store::Store;
