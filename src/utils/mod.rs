// Parsing utilities
pub mod parse_flag;
pub mod parse_int;
pub mod parse_list;

// JSON utilities
pub mod json_converter;

// Ordering utilities
pub mod natural_sort;

// Re-export all utilities for convenient access
pub use parse_flag::parse_flag;
pub use parse_int::{lenient_i64, parse_gib, parse_optional_int, GIB};
pub use parse_list::{non_blank, parse_csv};
pub use json_converter::value_to_plain_string;
pub use natural_sort::{natural_cmp, sort_by_display};
