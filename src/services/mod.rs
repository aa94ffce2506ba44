pub mod cloud_config;
pub mod create_request;
pub mod dns;

// Re-export commonly used functions
pub use cloud_config::{disk_setup_fragment, multipart_user_data, MIME_BOUNDARY};
pub use create_request::{build_create_request, merge_metadata, parse_custom_props, CreateContext};
pub use dns::{parse_dns_records, DNS_RECORD_TTL};
