pub mod ports;
pub mod repository;
pub mod scheduler;
pub mod staleness;
