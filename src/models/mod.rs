pub mod error_kind;
pub mod loaders;
pub mod record;
pub mod session;

pub use error_kind::ErrorKind;
pub use loaders::{discover_source_files, extensions_for_language};
pub use record::{AnalysisRecord, RecordStatus};
pub use session::{BatchSession, PauseInfo, PausePhase, SessionHandle, SessionState};
