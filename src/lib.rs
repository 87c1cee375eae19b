pub mod app;
pub mod args;
pub mod chapter;
pub mod convert;
pub mod error;
pub mod logging;
pub mod rewrite;
pub mod rules_file;
pub mod scan;
