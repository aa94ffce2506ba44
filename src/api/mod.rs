// Atomic API modules
pub mod access;
pub mod catalog;
pub mod client;
pub mod endpoints;
pub mod instances;
pub mod token;

// Re-export commonly used items
pub use client::{api_call, ApiClient};
pub use endpoints::discover_endpoints;
pub use token::TokenIssuer;
