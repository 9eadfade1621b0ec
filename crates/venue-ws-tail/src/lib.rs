/*
[INPUT]:  Tail binary modules
[OUTPUT]: Config loading and the tail runner for the binary and tests
[POS]:    Crate root - module wiring
[UPDATE]: When adding modules
*/

pub mod config;
pub mod tail;

pub use config::TailConfig;
pub use tail::run;
