pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod listing;
pub mod request;
pub mod session;
pub mod types;
pub mod utils;

pub use cache::{FetchCache, FetchState};
pub use client::ApiClient;
pub use config::{Config, ReplayPolicy};
pub use error::{ApiError, StoreError};
pub use request::{HttpTransport, RawResponse, ReqwestTransport, RequestDescriptor};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore, TokenPair};
pub use types::Resource;
