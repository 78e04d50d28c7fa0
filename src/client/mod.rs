//! Endpoint roles built on [`Base`](crate::base::Base)

mod publisher;
mod subscriber;

pub use publisher::Publisher;
pub use subscriber::Subscriber;
