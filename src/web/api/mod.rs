pub mod channels;
pub mod error;
pub mod stream;
pub mod tracks;
