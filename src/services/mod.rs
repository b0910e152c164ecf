pub mod dataset;
pub mod file_processor;
pub mod report;
pub mod summary;
