pub mod appointments;
pub mod conversations;
pub mod health;
