pub mod appointment;
pub mod conversation;
pub mod extraction;

pub use appointment::{Appointment, AppointmentStatus, NewAppointment};
pub use conversation::{Conversation, Message, MessageMetadata, MessageRole, NewMessage};
pub use extraction::{AppointmentCandidate, ExtractionResult};
