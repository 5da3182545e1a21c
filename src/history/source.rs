use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;

use super::error::HistoryError;
use super::types::History;

/// Where historical tracks come from. Loads are independent: two loads for the
/// same track may complete in any order.
pub trait HistorySource {
    fn load(&self, track_id: &str) -> impl Future<Output = Result<History, HistoryError>> + Send;
}

/// Serves `<folder>/<track_id>.json`.
pub struct FileHistorySource {
    folder: PathBuf,
}

impl FileHistorySource {
    pub fn new(folder: PathBuf) -> Self {
        Self { folder }
    }

    fn track_path(&self, track_id: &str) -> Result<PathBuf, HistoryError> {
        if !is_valid_track_id(track_id) {
            return Err(HistoryError::InvalidTrackId(track_id.to_string()));
        }
        Ok(self.folder.join(format!("{}.json", track_id)))
    }
}

impl HistorySource for FileHistorySource {
    async fn load(&self, track_id: &str) -> Result<History, HistoryError> {
        let path = self.track_path(track_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(HistoryError::NotFound(track_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let history = History::from_json(&content)?;
        log::debug!(
            "Loaded history file {} (vehicle {})",
            path.display(),
            history.vehicle.as_deref().unwrap_or("unnamed")
        );
        Ok(history)
    }
}

pub fn is_valid_track_id(track_id: &str) -> bool {
    !track_id.is_empty()
        && !track_id.starts_with('.')
        && track_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
