use crate::domain::models::{DisplayCategory, ReviewItem, ReviewStatus};
use chrono::{DateTime, Local, TimeZone, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayBoundary {
    #[default]
    Local,
    Named(Tz),
}

impl DayBoundary {
    pub fn from_name(name: Option<&str>) -> Result<Self, String> {
        let Some(name) = name.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(Self::Local);
        };
        if name.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        name.parse::<Tz>()
            .map(Self::Named)
            .map_err(|error| format!("unknown timezone '{name}': {error}"))
    }

    pub fn same_day(&self, left: DateTime<Utc>, right: DateTime<Utc>) -> bool {
        match self {
            Self::Local => same_calendar_day(&Local, left, right),
            Self::Named(tz) => same_calendar_day(tz, left, right),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReviewFilter {
    #[default]
    All,
    Pending,
    Overdue,
    Today,
    Completed,
}

impl ReviewFilter {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "pending" => Ok(Self::Pending),
            "overdue" => Ok(Self::Overdue),
            "today" => Ok(Self::Today),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unsupported review filter: {other}")),
        }
    }
}

pub fn same_calendar_day<Tz2: TimeZone>(
    zone: &Tz2,
    left: DateTime<Utc>,
    right: DateTime<Utc>,
) -> bool {
    left.with_timezone(zone).date_naive() == right.with_timezone(zone).date_naive()
}

/// First match wins: stored status beats anything derived from the clock.
pub fn classify(
    boundary: &DayBoundary,
    now: DateTime<Utc>,
    checkpoint: DateTime<Utc>,
    status: ReviewStatus,
) -> DisplayCategory {
    match status {
        ReviewStatus::Completed => DisplayCategory::Completed,
        ReviewStatus::Skipped => DisplayCategory::Skipped,
        ReviewStatus::Pending if checkpoint < now => DisplayCategory::Overdue,
        ReviewStatus::Pending if boundary.same_day(checkpoint, now) => DisplayCategory::DueToday,
        ReviewStatus::Pending => DisplayCategory::Pending,
    }
}

pub fn classify_checkpoints(
    boundary: &DayBoundary,
    now: DateTime<Utc>,
    item: &ReviewItem,
) -> Vec<DisplayCategory> {
    item.checkpoints
        .iter()
        .zip(item.statuses.iter())
        .map(|(checkpoint, status)| classify(boundary, now, *checkpoint, *status))
        .collect()
}

pub fn overall_category(
    boundary: &DayBoundary,
    now: DateTime<Utc>,
    item: &ReviewItem,
) -> DisplayCategory {
    if item.is_fully_completed() {
        return DisplayCategory::Completed;
    }
    let Some(index) = item.next_pending_index() else {
        return DisplayCategory::Pending;
    };
    match classify(boundary, now, item.checkpoints[index], ReviewStatus::Pending) {
        category @ (DisplayCategory::Overdue | DisplayCategory::DueToday) => category,
        _ => DisplayCategory::Pending,
    }
}

pub fn matches_filter(
    boundary: &DayBoundary,
    now: DateTime<Utc>,
    item: &ReviewItem,
    filter: ReviewFilter,
) -> bool {
    match filter {
        ReviewFilter::All => true,
        ReviewFilter::Completed => item.is_fully_completed(),
        ReviewFilter::Pending => item.pending_checkpoints().any(|checkpoint| checkpoint <= now),
        ReviewFilter::Overdue => item.pending_checkpoints().any(|checkpoint| checkpoint < now),
        ReviewFilter::Today => item
            .pending_checkpoints()
            .any(|checkpoint| boundary.same_day(checkpoint, now)),
    }
}

pub fn filter_items<'a>(
    boundary: &DayBoundary,
    now: DateTime<Utc>,
    items: &'a [ReviewItem],
    filter: ReviewFilter,
) -> Vec<&'a ReviewItem> {
    items
        .iter()
        .filter(|item| matches_filter(boundary, now, item, filter))
        .collect()
}
