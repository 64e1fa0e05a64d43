mod document;
mod message;
mod waitlist;

pub use document::*;
pub use message::*;
pub use waitlist::*;
