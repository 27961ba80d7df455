pub mod reply;
pub mod request;

pub use reply::normalize_reply;
pub use request::build_messages;
