// Library module
// Track catalog and stem folder discovery

pub mod catalog;
pub mod scanner;

pub use catalog::{Catalog, MediaLayout, Track};
pub use scanner::DirectoryScanner;
