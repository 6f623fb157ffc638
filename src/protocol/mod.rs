pub mod body;
mod message;
mod request;
mod response;

pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;
pub use request::{Request, RequestHead};
pub use response::{Response, ResponseHead};
