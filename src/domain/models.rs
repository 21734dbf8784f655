use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CHECKPOINT_COUNT: usize = 8;

pub const INTERVAL_MINUTES: [i64; CHECKPOINT_COUNT] =
    [20, 60, 1440, 2880, 5760, 10080, 21600, 43200];

const INTERVAL_LABELS: [&str; CHECKPOINT_COUNT] = [
    "20 minutes",
    "1 hour",
    "1 day",
    "2 days",
    "4 days",
    "7 days",
    "15 days",
    "30 days",
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IntervalSpec {
    pub index: usize,
    pub label: &'static str,
    pub minutes: i64,
}

pub fn interval_table() -> Vec<IntervalSpec> {
    INTERVAL_MINUTES
        .iter()
        .zip(INTERVAL_LABELS)
        .enumerate()
        .map(|(index, (minutes, label))| IntervalSpec {
            index,
            label,
            minutes: *minutes,
        })
        .collect()
}

pub fn interval_label(index: usize) -> Option<&'static str> {
    INTERVAL_LABELS.get(index).copied()
}

/// Stored per-checkpoint state. Only user actions change it; "overdue" is
/// derived at display time and never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Skipped,
    Completed,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Skipped => "skipped",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "0" | "pending" => Ok(Self::Pending),
            "1" | "skipped" | "skip" => Ok(Self::Skipped),
            "2" | "completed" | "complete" | "done" => Ok(Self::Completed),
            other => Err(format!("unsupported review status: {other}")),
        }
    }
}

impl TryFrom<u8> for ReviewStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Skipped),
            2 => Ok(Self::Completed),
            other => Err(format!("review status must be 0, 1 or 2; got {other}")),
        }
    }
}

impl From<ReviewStatus> for u8 {
    fn from(value: ReviewStatus) -> Self {
        match value {
            ReviewStatus::Pending => 0,
            ReviewStatus::Skipped => 1,
            ReviewStatus::Completed => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DisplayCategory {
    Completed,
    Skipped,
    Overdue,
    DueToday,
    Pending,
}

impl DisplayCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Overdue => "overdue",
            Self::DueToday => "due_today",
            Self::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewItem {
    pub id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub checkpoints: [DateTime<Utc>; CHECKPOINT_COUNT],
    pub statuses: [ReviewStatus; CHECKPOINT_COUNT],
}

impl ReviewItem {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.content, "review.content")?;
        for (index, pair) in self.checkpoints.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(format!(
                    "review.checkpoints must be strictly increasing (index {})",
                    index + 1
                ));
            }
        }
        if self.checkpoints[0] < self.created_at {
            return Err("review.checkpoints must not precede review.created_at".to_string());
        }
        Ok(())
    }

    pub fn is_fully_completed(&self) -> bool {
        self.statuses
            .iter()
            .all(|status| *status == ReviewStatus::Completed)
    }

    pub fn completed_count(&self) -> usize {
        self.statuses
            .iter()
            .filter(|status| **status == ReviewStatus::Completed)
            .count()
    }

    pub fn progress_percent(&self) -> u8 {
        let percent = (self.completed_count() * 100) as f64 / CHECKPOINT_COUNT as f64;
        percent.round() as u8
    }

    pub fn next_pending_index(&self) -> Option<usize> {
        self.statuses
            .iter()
            .position(|status| *status == ReviewStatus::Pending)
    }

    pub fn pending_checkpoints(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.checkpoints
            .iter()
            .zip(self.statuses.iter())
            .filter(|(_, status)| **status == ReviewStatus::Pending)
            .map(|(checkpoint, _)| *checkpoint)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ReviewStats {
    pub total: usize,
    pub overdue: usize,
    pub due_today: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSession {
    pub token: String,
    pub user: AuthUser,
    pub saved_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.token, "session.token")?;
        validate_non_empty(&self.user.username, "session.user.username")
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_item() -> ReviewItem {
        let created_at = fixed_time("2026-02-16T08:00:00Z");
        let checkpoints =
            std::array::from_fn(|index| created_at + Duration::minutes(INTERVAL_MINUTES[index]));
        ReviewItem {
            id: 1,
            content: "Irregular verbs".to_string(),
            created_at,
            checkpoints,
            statuses: [ReviewStatus::Pending; CHECKPOINT_COUNT],
        }
    }

    #[test]
    fn interval_table_is_strictly_increasing_with_labels() {
        let table = interval_table();
        assert_eq!(table.len(), CHECKPOINT_COUNT);
        assert!(table.windows(2).all(|pair| pair[0].minutes < pair[1].minutes));
        assert_eq!(table[2].label, "1 day");
        assert_eq!(table[7].minutes, 43200);
        assert_eq!(interval_label(8), None);
    }

    #[test]
    fn review_item_validate_accepts_generated_item() {
        assert!(sample_item().validate().is_ok());
    }

    #[test]
    fn review_item_validate_rejects_blank_content_and_unordered_checkpoints() {
        let mut blank = sample_item();
        blank.content = "  ".to_string();
        assert!(blank.validate().is_err());

        let mut unordered = sample_item();
        unordered.checkpoints.swap(3, 4);
        assert!(unordered.validate().is_err());
    }

    #[test]
    fn progress_and_next_pending_follow_statuses() {
        let mut item = sample_item();
        assert_eq!(item.progress_percent(), 0);
        assert_eq!(item.next_pending_index(), Some(0));

        item.statuses[0] = ReviewStatus::Completed;
        item.statuses[1] = ReviewStatus::Skipped;
        assert_eq!(item.completed_count(), 1);
        assert_eq!(item.progress_percent(), 13);
        assert_eq!(item.next_pending_index(), Some(2));
        assert_eq!(item.pending_checkpoints().count(), 6);

        item.statuses = [ReviewStatus::Completed; CHECKPOINT_COUNT];
        assert!(item.is_fully_completed());
        assert_eq!(item.progress_percent(), 100);
        assert_eq!(item.next_pending_index(), None);
    }

    #[test]
    fn review_status_parses_names_and_codes() {
        assert_eq!(ReviewStatus::parse("completed"), Ok(ReviewStatus::Completed));
        assert_eq!(ReviewStatus::parse(" 1 "), Ok(ReviewStatus::Skipped));
        assert_eq!(ReviewStatus::parse("Pending"), Ok(ReviewStatus::Pending));
        assert!(ReviewStatus::parse("in_progress").is_err());
        assert!(ReviewStatus::try_from(3u8).is_err());
    }

    proptest! {
        #[test]
        fn review_status_code_roundtrip(code in 0u8..3u8) {
            let status = ReviewStatus::try_from(code).expect("valid code");
            prop_assert_eq!(u8::from(status), code);
        }
    }

    #[test]
    fn stored_session_validate_rejects_empty_token() {
        let session = StoredSession {
            token: " ".to_string(),
            user: AuthUser {
                id: None,
                username: "reader".to_string(),
                email: None,
            },
            saved_at: fixed_time("2026-02-16T08:00:00Z"),
        };
        assert!(session.validate().is_err());
    }

    #[test]
    fn domain_models_support_serde_roundtrip() {
        let item = sample_item();
        let roundtrip: ReviewItem =
            serde_json::from_str(&serde_json::to_string(&item).expect("serialize item"))
                .expect("deserialize item");
        assert_eq!(roundtrip, item);

        let statuses = serde_json::to_string(&item.statuses).expect("serialize statuses");
        assert_eq!(statuses, "[0,0,0,0,0,0,0,0]");
    }
}
