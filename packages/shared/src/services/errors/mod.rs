pub mod auth_service_errors;
pub mod battle_errors;
pub mod chess_service_errors;
pub mod match_service_errors;
pub mod match_state_errors;
