pub mod format;

pub use format::{bar, format_duration, format_watts, truncate_string};
