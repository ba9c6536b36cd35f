pub mod job;
pub mod resolution;
pub mod target;
