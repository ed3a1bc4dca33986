pub mod file_ctx;
pub mod file_flow;
pub mod pause_controller;

pub use file_ctx::FileCtx;
pub use file_flow::{FileFlow, FileOutcome};
pub use pause_controller::{PauseController, PauseStatus, RetryOutcome, RetryTrigger};
