use crate::domain::classifier::{DayBoundary, classify};
use crate::domain::models::{
    CHECKPOINT_COUNT, DisplayCategory, ReviewItem, ReviewStats, ReviewStatus,
};
use chrono::{DateTime, Utc};

pub fn summarize(boundary: &DayBoundary, items: &[ReviewItem], now: DateTime<Utc>) -> ReviewStats {
    let mut stats = ReviewStats {
        total: items.len(),
        ..ReviewStats::default()
    };

    for item in items {
        if item.is_fully_completed() {
            stats.completed += 1;
            continue;
        }
        for checkpoint in item.pending_checkpoints() {
            match classify(boundary, now, checkpoint, ReviewStatus::Pending) {
                DisplayCategory::Overdue => stats.overdue += 1,
                DisplayCategory::DueToday => stats.due_today += 1,
                _ => {}
            }
        }
    }

    stats
}

pub fn completion_rate(items: &[ReviewItem]) -> u8 {
    let total = items.len() * CHECKPOINT_COUNT;
    if total == 0 {
        return 0;
    }
    let completed: usize = items.iter().map(ReviewItem::completed_count).sum();
    ((completed * 100) as f64 / total as f64).round() as u8
}
