mod common;
mod documents;
mod messages;
mod waitlist;

pub use documents::SqliteDocumentRepo;
pub use messages::SqliteMessageRepo;
pub use waitlist::SqliteWaitlistRepo;
