//! Authenticated HTTP pipeline.

mod client;
pub mod request;
mod token;
pub mod transport;

pub use client::ApiClient;
pub use request::{ApiRequest, ApiResponse, Method, extract_access_token};
pub use token::TokenStore;
pub use transport::{ReqwestTransport, StubReply, StubTransport, Transport};
