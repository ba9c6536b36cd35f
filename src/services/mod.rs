pub mod codec;
pub mod decision;
pub mod fetch;
pub mod queue;
pub mod resolution;
pub mod targets;
pub mod vision;
pub mod worker;
