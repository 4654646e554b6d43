pub mod cast;
pub mod health;
pub mod hosts;
