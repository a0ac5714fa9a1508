pub mod health;
pub mod tutor;
