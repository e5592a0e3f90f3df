//! CLI commands for the whale scanner.

pub mod scan;

pub use scan::{run_scan, ScanArgs};
