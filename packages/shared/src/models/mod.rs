pub mod board;
pub mod clock;
pub mod intent;
pub mod log_entry;
pub mod match_session;
pub mod modifier;
pub mod piece;
pub mod roster;
pub mod seed;
