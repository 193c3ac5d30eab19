//! CLI command handlers, one per file.

mod convert;
mod formats;
mod probe;

pub use convert::{run_convert, ConvertOptions};
pub use formats::run_formats;
pub use probe::run_probe;
