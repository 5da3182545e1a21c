mod store;

pub use store::{Channel, ChannelStore};
