//! API Module
//!
//! HTTP endpoints of the transaction service.

mod error;
mod handlers;
mod pagination;
mod server;

pub use error::ApiError;
pub use pagination::{Page, RequestContext, etag, page_request};
pub use server::{API_PREFIX, AppState, Server, router};
