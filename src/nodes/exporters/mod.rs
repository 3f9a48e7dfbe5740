//! Terminal nodes pushing data out of the pipeline

pub mod console_logger;

pub use console_logger::ConsoleLoggerNode;
