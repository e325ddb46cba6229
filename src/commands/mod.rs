//! Command implementations
//!
//! Each module corresponds to a subcommand in the CLI.

pub mod ask;
pub mod forget;
pub mod ingest;
pub mod serve;

pub use ask::run as ask_run;
pub use forget::{run as forget_run, ForgetArgs};
pub use ingest::{run as ingest_run, IngestArgs, IngestResult};
pub use serve::run as serve_run;
