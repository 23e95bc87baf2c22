//! Pseudo-terminal process runner

mod process;

pub use process::{check_status, launch, Killer, OutputSink, PtyCommand, PtyProcess, LAUNCH_FAILURE};
