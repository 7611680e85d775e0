pub mod run;

pub use run::{RunArgs, run_session};
