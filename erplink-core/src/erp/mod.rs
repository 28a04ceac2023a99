//! ERP HTTP surface: wire types, per-request signing and the typed client.

pub mod client;
pub mod models;
pub mod signer;

pub use client::ErpClient;
pub use models::{GenerationInfo, LoginResponse, RegisterRequest, RegisterResponse};
pub use signer::{RequestSigner, SignedHeaders};
