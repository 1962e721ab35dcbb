//! `DeleteEvent` (§3): an append-only log entry attached to whichever set
//! the removal happened in, consumed by clients pulling updates since a
//! watermark.

use serde::{Deserialize, Serialize};
use wire::DeleteEventType;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeleteEvent {
    pub file: String,
    pub album_id: String,
    pub kind: DeleteEventType,
    pub date: i64,
}

impl DeleteEvent {
    pub fn new(file: impl Into<String>, album_id: impl Into<String>, kind: DeleteEventType, date: i64) -> Self {
        DeleteEvent {
            file: file.into(),
            album_id: album_id.into(),
            kind,
            date,
        }
    }
}

/// Appends `events` onto `log`, sorted so later merges can binary-search by
/// `(date, file)` without re-sorting the whole log.
pub fn append_sorted(log: &mut Vec<DeleteEvent>, events: impl IntoIterator<Item = DeleteEvent>) {
    log.extend(events);
    log.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.file.cmp(&b.file)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_sorted_orders_by_date_then_file() {
        let mut log = Vec::new();
        append_sorted(
            &mut log,
            vec![
                DeleteEvent::new("b.jpg", "", DeleteEventType::GalleryMove, 20),
                DeleteEvent::new("a.jpg", "", DeleteEventType::GalleryMove, 20),
                DeleteEvent::new("c.jpg", "", DeleteEventType::TrashDelete, 10),
            ],
        );
        let ordered: Vec<_> = log.iter().map(|e| e.file.as_str()).collect();
        assert_eq!(ordered, vec!["c.jpg", "a.jpg", "b.jpg"]);
    }
}
