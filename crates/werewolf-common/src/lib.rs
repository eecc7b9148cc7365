pub mod player;
pub mod protocol;
pub mod role;
pub mod session;
