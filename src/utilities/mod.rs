// Utilities module
// Path normalization and exclusion patterns

pub mod paths;
pub mod patterns;

pub use paths::{local_join, normalize_relative, remote_join};
pub use patterns::{matches_pattern, PatternMatcher};
