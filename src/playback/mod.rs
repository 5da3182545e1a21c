mod cursor;
mod indexer;
mod track;

pub use cursor::PlaybackCursor;
pub use indexer::TrackIndexer;
pub use track::Track;
