pub mod process;
pub mod runner;

pub use process::{BackupProcess, BackupResult, ResticProcess};
pub use runner::BackupRunner;
