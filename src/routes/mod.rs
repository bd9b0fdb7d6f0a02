pub mod health;
pub mod returns;
