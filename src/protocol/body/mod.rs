mod content;
mod stream;
mod upgraded;

pub use content::{Content, ContentStream};
pub use stream::{BodyStream, Released};
pub use upgraded::Upgraded;

pub(crate) use stream::BodyFrame;
pub(crate) use upgraded::UpgradeSlot;
