pub mod error;
pub mod output_macros;
pub mod validation;

// Re-export the naming helpers used by every reconciler
pub use validation::{get_valid_name, is_valid_email, sanitize_tag};
