pub mod config;
pub mod errors;
pub mod logging;
pub mod parser;
pub mod runtime;
pub mod shell;
pub mod stream;
pub mod util;
pub mod validation;
pub mod workbench;
pub mod workflow;
