mod documents;
mod messages;
mod waitlist;

pub use documents::DocumentRepo;
pub use messages::MessageRepo;
pub use waitlist::WaitlistRepo;
