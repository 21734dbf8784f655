use crate::domain::models::{
    CHECKPOINT_COUNT, INTERVAL_MINUTES, ReviewItem, ReviewStatus,
};
use chrono::{DateTime, Duration, Utc};

pub fn create_item(
    content: &str,
    start: DateTime<Utc>,
    previous_max_id: Option<i64>,
) -> Result<ReviewItem, String> {
    let content = content.trim();
    if content.is_empty() {
        return Err("content must not be empty".to_string());
    }

    let checkpoints: [DateTime<Utc>; CHECKPOINT_COUNT] =
        std::array::from_fn(|index| start + Duration::minutes(INTERVAL_MINUTES[index]));

    Ok(ReviewItem {
        id: next_item_id(start, previous_max_id),
        content: content.to_string(),
        created_at: start,
        checkpoints,
        statuses: [ReviewStatus::Pending; CHECKPOINT_COUNT],
    })
}

pub fn next_item_id(start: DateTime<Utc>, previous_max_id: Option<i64>) -> i64 {
    let candidate = start.timestamp_millis();
    match previous_max_id {
        Some(max_id) if max_id >= candidate => max_id.saturating_add(1),
        _ => candidate,
    }
}
