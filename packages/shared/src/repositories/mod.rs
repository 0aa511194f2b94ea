pub mod errors;
pub mod match_repository;
pub mod memory_match_repository;
