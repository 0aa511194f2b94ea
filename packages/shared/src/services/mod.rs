pub mod auth_service;
pub mod battle_bridge;
pub mod chess_service;
pub mod errors;
pub mod match_service;
pub mod match_state;
pub mod resync;
pub mod showdown_engine;
pub mod showdown_protocol;
