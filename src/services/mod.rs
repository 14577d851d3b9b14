pub mod recommendations;
pub mod session;
