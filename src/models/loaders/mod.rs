pub mod source_loader;

pub use source_loader::{discover_source_files, extensions_for_language};
