use crate::domain::models::{CHECKPOINT_COUNT, ReviewItem, ReviewStatus};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ReviewItemRecord {
    pub id: i64,
    pub content: String,
    #[serde(rename = "addTime", alias = "startDate")]
    pub add_time: String,
    #[serde(rename = "reviewDates")]
    pub review_dates: Vec<String>,
    pub status: Vec<u8>,
}

pub fn format_instant(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn encode_item(item: &ReviewItem) -> ReviewItemRecord {
    ReviewItemRecord {
        id: item.id,
        content: item.content.clone(),
        add_time: format_instant(item.created_at),
        review_dates: item.checkpoints.iter().copied().map(format_instant).collect(),
        status: item.statuses.iter().copied().map(u8::from).collect(),
    }
}

pub fn decode_item(record: &ReviewItemRecord) -> Result<ReviewItem, InfraError> {
    let content = record.content.trim();
    if content.is_empty() {
        return Err(InfraError::Validation(format!(
            "review {} has empty content",
            record.id
        )));
    }
    if record.review_dates.len() != CHECKPOINT_COUNT {
        return Err(InfraError::Validation(format!(
            "review {} must carry {CHECKPOINT_COUNT} reviewDates; got {}",
            record.id,
            record.review_dates.len()
        )));
    }
    if record.status.len() != CHECKPOINT_COUNT {
        return Err(InfraError::Validation(format!(
            "review {} must carry {CHECKPOINT_COUNT} status values; got {}",
            record.id,
            record.status.len()
        )));
    }

    let created_at = parse_rfc3339_utc(&record.add_time, "addTime")?;
    let mut checkpoints = [created_at; CHECKPOINT_COUNT];
    for (slot, raw) in checkpoints.iter_mut().zip(&record.review_dates) {
        *slot = parse_rfc3339_utc(raw, "reviewDates[]")?;
    }
    let mut statuses = [ReviewStatus::Pending; CHECKPOINT_COUNT];
    for (slot, raw) in statuses.iter_mut().zip(&record.status) {
        *slot = ReviewStatus::try_from(*raw).map_err(InfraError::Validation)?;
    }

    let item = ReviewItem {
        id: record.id,
        content: content.to_string(),
        created_at,
        checkpoints,
        statuses,
    };
    item.validate().map_err(InfraError::Validation)?;
    Ok(item)
}

pub fn encode_snapshot(items: &[ReviewItem]) -> Vec<ReviewItemRecord> {
    items.iter().map(encode_item).collect()
}

pub fn decode_snapshot(records: &[ReviewItemRecord]) -> Result<Vec<ReviewItem>, InfraError> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut items = Vec::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id) {
            return Err(InfraError::Validation(format!(
                "duplicate review id {} in snapshot",
                record.id
            )));
        }
        items.push(decode_item(record)?);
    }
    Ok(items)
}

pub fn snapshot_to_json(items: &[ReviewItem]) -> Result<String, InfraError> {
    Ok(serde_json::to_string(&encode_snapshot(items))?)
}

pub fn snapshot_from_json(raw: &str) -> Result<Vec<ReviewItem>, InfraError> {
    let records: Vec<ReviewItemRecord> = serde_json::from_str(raw)?;
    decode_snapshot(&records)
}

fn parse_rfc3339_utc(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| {
            InfraError::Validation(format!("invalid {field_name} '{value}': {error}"))
        })
}
