pub mod events;
pub mod generation;
pub mod job_store;
pub mod photo_repository;
pub mod processor;
pub mod queue;
pub mod status;
pub mod storage;
pub mod submission;
pub mod webhook;
pub mod worker_pool;
