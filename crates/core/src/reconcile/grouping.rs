//! Ordered bucketing of reconciled records for sectioned list rendering.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::config::{RollcallConfig, DEFAULT_DATE_FIELDS};
use crate::records::Record;

/// Label format for calendar-day buckets, e.g. `January 1, 2024`.
pub const DAY_LABEL_FORMAT: &str = "%B %-d, %Y";

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// One named group of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedBucket<T> {
    pub bucket_key: String,
    pub items: Vec<T>,
}

/// Options for [`GroupingIndex::build`].
#[derive(Debug, Clone)]
pub struct GroupingOptions {
    pub normalize_dates: bool,
    /// Field names whose values are timestamps eligible for day normalization.
    pub date_fields: Vec<String>,
    /// Offset used to decide which calendar day an instant belongs to.
    pub day_offset: FixedOffset,
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            normalize_dates: false,
            date_fields: DEFAULT_DATE_FIELDS.iter().map(|f| f.to_string()).collect(),
            day_offset: Utc.fix(),
        }
    }
}

impl GroupingOptions {
    pub fn from_config(config: &RollcallConfig) -> Self {
        Self {
            normalize_dates: false,
            date_fields: config.date_fields.clone(),
            day_offset: config.day_offset(),
        }
    }

    pub fn normalizing_dates(mut self) -> Self {
        self.normalize_dates = true;
        self
    }

    fn is_date_field(&self, field: &str) -> bool {
        self.date_fields.iter().any(|f| f == field)
    }
}

/// Records partitioned into buckets, ordered by the first time each key was seen.
///
/// Every input record lands in exactly one bucket. Bucket order is discovery order, never
/// sorted; callers that want chronological sections sort the records first.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupingIndex<T> {
    buckets: Vec<GroupedBucket<T>>,
    positions: HashMap<String, usize>,
}

impl<T> Default for GroupingIndex<T> {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl GroupingIndex<Record> {
    /// Single pass over `records`; empty records are skipped.
    pub fn build<I>(records: I, key: &str, options: &GroupingOptions) -> Self
    where
        I: IntoIterator<Item = Record>,
    {
        let normalize = options.normalize_dates && options.is_date_field(key);
        let mut index = Self::default();
        for record in records {
            if record.is_empty() {
                continue;
            }
            let bucket_key = match record.get(key) {
                Some(value) if normalize => day_label(value, options.day_offset)
                    .unwrap_or_else(|| value_label(value)),
                Some(value) => value_label(value),
                None => String::new(),
            };
            index.push(bucket_key, record);
        }
        index
    }
}

impl<T> GroupingIndex<T> {
    fn push(&mut self, bucket_key: String, item: T) {
        if let Some(&idx) = self.positions.get(&bucket_key) {
            self.buckets[idx].items.push(item);
            return;
        }
        self.positions.insert(bucket_key.clone(), self.buckets.len());
        self.buckets.push(GroupedBucket {
            bucket_key,
            items: vec![item],
        });
    }

    pub fn buckets(&self) -> &[GroupedBucket<T>] {
        &self.buckets
    }

    pub fn get(&self, bucket_key: &str) -> Option<&[T]> {
        self.positions
            .get(bucket_key)
            .map(|&idx| self.buckets[idx].items.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|b| b.bucket_key.as_str())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn into_buckets(self) -> Vec<GroupedBucket<T>> {
        self.buckets
    }

    pub fn into_map(self) -> HashMap<String, Vec<T>> {
        self.buckets
            .into_iter()
            .map(|bucket| (bucket.bucket_key, bucket.items))
            .collect()
    }
}

/// Groups `records` by the value of `key`, using the default date fields.
pub fn group_by<I>(records: I, key: &str, normalize_dates: bool) -> GroupingIndex<Record>
where
    I: IntoIterator<Item = Record>,
{
    let options = GroupingOptions {
        normalize_dates,
        ..GroupingOptions::default()
    };
    GroupingIndex::build(records, key, &options)
}

fn value_label(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(v) => v.clone(),
        Value::Bool(v) => v.to_string(),
        Value::Number(v) => v.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Calendar-day label for a timestamp value, or `None` when it is not a timestamp.
pub fn day_label(value: &Value, offset: FixedOffset) -> Option<String> {
    let day = match value {
        Value::String(raw) => parse_day(raw.trim(), offset)?,
        Value::Number(millis) => {
            let instant = DateTime::<Utc>::from_timestamp_millis(millis.as_i64()?)?;
            instant.with_timezone(&offset).date_naive()
        }
        _ => return None,
    };
    Some(day.format(DAY_LABEL_FORMAT).to_string())
}

fn parse_day(raw: &str, offset: FixedOffset) -> Option<NaiveDate> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&offset).date_naive());
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn r(value: Value) -> Record {
        Record::from_value(value).expect("object")
    }

    #[test]
    fn same_day_timestamps_share_a_bucket() {
        let records = vec![
            r(json!({ "_id": 1, "createdAt": "2024-01-01T08:00" })),
            r(json!({ "_id": 2, "createdAt": "2024-01-01T21:00" })),
            r(json!({ "_id": 3, "createdAt": "2024-01-02T00:01" })),
        ];
        let index = group_by(records, "createdAt", true);

        assert_eq!(
            index.keys().collect::<Vec<_>>(),
            vec!["January 1, 2024", "January 2, 2024"]
        );
        assert_eq!(index.get("January 1, 2024").map(|b| b.len()), Some(2));
        assert_eq!(index.get("January 2, 2024").map(|b| b.len()), Some(1));
    }

    #[test]
    fn without_normalization_exact_values_are_keys() {
        let records = vec![
            r(json!({ "createdAt": "2024-01-01T08:00" })),
            r(json!({ "createdAt": "2024-01-01T21:00" })),
        ];
        let index = group_by(records, "createdAt", false);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn normalization_only_applies_to_date_fields() {
        let records = vec![
            r(json!({ "note": "2024-01-01T08:00" })),
            r(json!({ "note": "2024-01-01T09:00" })),
        ];
        let index = group_by(records, "note", true);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn bucket_order_is_first_seen_not_sorted() {
        let records = vec![
            r(json!({ "status": "todo" })),
            r(json!({ "status": "done" })),
            r(json!({ "status": "todo" })),
            r(json!({ "status": "blocked" })),
        ];
        let buckets = group_by(records, "status", false).into_buckets();
        let keys = buckets.iter().map(|b| b.bucket_key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["todo", "done", "blocked"]);
        assert_eq!(buckets[0].items.len(), 2);
    }

    #[test]
    fn every_record_lands_in_exactly_one_bucket() {
        let records = (0..25)
            .map(|i| r(json!({ "_id": i, "category": format!("c{}", i % 4) })))
            .collect::<Vec<_>>();
        let map = group_by(records, "category", false).into_map();
        assert_eq!(map.len(), 4);
        assert_eq!(map.values().map(Vec::len).sum::<usize>(), 25);
    }

    #[test]
    fn empty_records_are_skipped_and_missing_values_share_blank_bucket() {
        let records = vec![
            Record::new(),
            r(json!({ "_id": 1 })),
            r(json!({ "_id": 2, "category": null })),
            r(json!({ "_id": 3, "category": "vip" })),
        ];
        let index = group_by(records, "category", false);
        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["", "vip"]);
        assert_eq!(index.get("").map(|b| b.len()), Some(2));
    }

    #[test]
    fn offset_timestamps_use_configured_day_offset() {
        let late_utc = json!("2024-03-10T23:30:00Z");
        assert_eq!(
            day_label(&late_utc, FixedOffset::east_opt(0).expect("offset")).as_deref(),
            Some("March 10, 2024")
        );
        assert_eq!(
            day_label(&late_utc, FixedOffset::east_opt(2 * 3600).expect("offset")).as_deref(),
            Some("March 11, 2024")
        );
    }

    #[test]
    fn epoch_millis_and_plain_dates_are_recognized() {
        let offset = FixedOffset::east_opt(0).expect("offset");
        assert_eq!(
            day_label(&json!(1_704_067_200_000_i64), offset).as_deref(),
            Some("January 1, 2024")
        );
        assert_eq!(
            day_label(&json!("2024-02-29"), offset).as_deref(),
            Some("February 29, 2024")
        );
        assert_eq!(day_label(&json!("tomorrow"), offset), None);
    }

    #[test]
    fn unparseable_dates_fall_back_to_raw_value() {
        let records = vec![r(json!({ "updatedAt": "unknown" }))];
        let index = group_by(records, "updatedAt", true);
        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["unknown"]);
    }
}
