pub mod command;
pub mod file;
pub mod plotting;
pub mod report;
pub mod streams;
pub mod system;
