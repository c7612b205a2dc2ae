pub mod job;
pub mod photo;
pub mod requests;
