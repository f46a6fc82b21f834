//! Submitted record history.
//!
//! Records can be edited or deleted only on the local calendar day they
//! were created. The window is checked here before any request is made;
//! the server enforces it again.

use chrono::{Local, NaiveDate};

use crate::error::{SubmitError, ValidationError};
use crate::models::{Coordinates, Record, RecordId, RecordUpdate, SurveyorId};
use crate::submit::{optional_text, parse_price};
use crate::traits::RecordSink;

/// A record with its edit permission for a given day.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordView {
    pub record: Record,
    pub can_edit: bool,
}

pub fn is_editable(record: &Record, today: NaiveDate) -> bool {
    record.created_at.date() == today
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Lists the surveyor's records, optionally for one day, newest first.
/// Records created in the same second keep the backend's order.
pub async fn list_records(
    sink: &dyn RecordSink,
    surveyor_id: SurveyorId,
    date: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<Vec<RecordView>, SubmitError> {
    let mut records = sink.list_records(surveyor_id, date).await?;
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(records
        .into_iter()
        .map(|record| RecordView {
            can_edit: is_editable(&record, today),
            record,
        })
        .collect())
}

/// Fields of an edit form, as typed. Blank fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordEdit {
    pub store_name: String,
    pub store_address: String,
    pub price: String,
    pub promotion_info: String,
    pub remark: String,
    pub coordinates: Option<Coordinates>,
}

impl RecordEdit {
    /// Builds the partial update. A typed price must still be valid.
    pub fn to_update(&self) -> Result<RecordUpdate, ValidationError> {
        let price = if self.price.trim().is_empty() {
            None
        } else {
            Some(parse_price(&self.price)?)
        };
        Ok(RecordUpdate {
            store_name: optional_text(&self.store_name),
            store_address: optional_text(&self.store_address),
            price,
            promotion_info: optional_text(&self.promotion_info),
            remark: optional_text(&self.remark),
            latitude: self.coordinates.map(|c| c.latitude),
            longitude: self.coordinates.map(|c| c.longitude),
        })
    }
}

/// Applies an edit. Returns `false` when there was nothing to send.
pub async fn update_record(
    sink: &dyn RecordSink,
    record: &Record,
    edit: &RecordEdit,
    today: NaiveDate,
) -> Result<bool, SubmitError> {
    if !is_editable(record, today) {
        return Err(ValidationError::EditWindowClosed(record.id).into());
    }
    let update = edit.to_update()?;
    if update.is_empty() {
        return Ok(false);
    }
    sink.update_record(record.id, &update).await?;
    tracing::info!(record_id = record.id, "record updated");
    Ok(true)
}

pub async fn delete_record(
    sink: &dyn RecordSink,
    record: &Record,
    today: NaiveDate,
) -> Result<(), SubmitError> {
    if !is_editable(record, today) {
        return Err(ValidationError::EditWindowClosed(record.id).into());
    }
    sink.delete_record(record.id).await?;
    tracing::info!(record_id = record.id, "record deleted");
    Ok(())
}

/// Looks a record up by id among the surveyor's records.
pub async fn find_record(
    sink: &dyn RecordSink,
    surveyor_id: SurveyorId,
    id: RecordId,
) -> Result<Option<Record>, SubmitError> {
    let records = sink.list_records(surveyor_id, None).await?;
    Ok(records.into_iter().find(|r| r.id == id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::models::RecordPayload;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSink {
        records: Vec<Record>,
        updates: Mutex<Vec<(RecordId, RecordUpdate)>>,
        deletes: Mutex<Vec<RecordId>>,
    }

    #[async_trait]
    impl RecordSink for FakeSink {
        async fn create_record(&self, _p: &RecordPayload) -> Result<RecordId, TransportError> {
            Ok(1)
        }

        async fn update_record(&self, id: RecordId, update: &RecordUpdate) -> Result<(), TransportError> {
            self.updates.lock().unwrap().push((id, update.clone()));
            Ok(())
        }

        async fn delete_record(&self, id: RecordId) -> Result<(), TransportError> {
            self.deletes.lock().unwrap().push(id);
            Ok(())
        }

        async fn list_records(
            &self,
            _surveyor_id: SurveyorId,
            _date: Option<NaiveDate>,
        ) -> Result<Vec<Record>, TransportError> {
            Ok(self.records.clone())
        }
    }

    fn record(id: RecordId, created_at: &str) -> Record {
        Record {
            id,
            item_id: 10,
            surveyor_id: 7,
            store_name: "Harbor Mart".to_string(),
            store_address: None,
            price: 5.99,
            promotion_info: None,
            remark: None,
            latitude: None,
            longitude: None,
            photo_path: None,
            photos: Some(vec!["/static/photos/a.jpg".to_string()]),
            created_at: NaiveDateTime::parse_from_str(created_at, "%Y-%m-%d %H:%M:%S").unwrap(),
            product_name: Some("Tomato".to_string()),
            category: Some("produce".to_string()),
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn listing_marks_only_todays_records_editable() {
        let sink = FakeSink {
            records: vec![
                record(1, "2024-02-05 09:15:00"),
                record(2, "2024-02-04 23:59:59"),
            ],
            ..Default::default()
        };
        let views = list_records(&sink, 7, None, day("2024-02-05")).await.unwrap();
        assert!(views[0].can_edit);
        assert!(!views[1].can_edit);
    }

    #[tokio::test]
    async fn listing_is_newest_first_whatever_the_backend_order() {
        let sink = FakeSink {
            records: vec![
                record(1, "2024-02-03 08:00:00"),
                record(2, "2024-02-05 07:30:00"),
                record(3, "2024-02-04 18:45:00"),
                record(4, "2024-02-05 11:00:00"),
            ],
            ..Default::default()
        };
        let views = list_records(&sink, 7, None, day("2024-02-05")).await.unwrap();
        let ids: Vec<RecordId> = views.iter().map(|v| v.record.id).collect();
        assert_eq!(ids, vec![4, 2, 3, 1]);
        assert!(views[0].can_edit && views[1].can_edit);
        assert!(!views[2].can_edit);
    }

    #[tokio::test]
    async fn old_records_are_refused_without_a_request() {
        let sink = FakeSink::default();
        let old = record(2, "2024-02-04 18:00:00");

        let err = delete_record(&sink, &old, day("2024-02-05")).await.unwrap_err();
        assert_eq!(err, SubmitError::Validation(ValidationError::EditWindowClosed(2)));

        let edit = RecordEdit {
            price: "6".to_string(),
            ..Default::default()
        };
        assert!(update_record(&sink, &old, &edit, day("2024-02-05")).await.is_err());
        assert!(sink.deletes.lock().unwrap().is_empty());
        assert!(sink.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_sends_only_typed_fields() {
        let sink = FakeSink::default();
        let rec = record(1, "2024-02-05 09:15:00");
        let edit = RecordEdit {
            price: " 6.50 ".to_string(),
            remark: " restocked ".to_string(),
            store_name: "  ".to_string(),
            ..Default::default()
        };

        assert!(update_record(&sink, &rec, &edit, day("2024-02-05")).await.unwrap());
        let updates = sink.updates.lock().unwrap();
        assert_eq!(updates[0].0, 1);
        assert_eq!(updates[0].1.price, Some(6.5));
        assert_eq!(updates[0].1.remark.as_deref(), Some("restocked"));
        assert_eq!(updates[0].1.store_name, None);
    }

    #[tokio::test]
    async fn blank_edit_is_a_no_op() {
        let sink = FakeSink::default();
        let rec = record(1, "2024-02-05 09:15:00");
        let sent = update_record(&sink, &rec, &RecordEdit::default(), day("2024-02-05"))
            .await
            .unwrap();
        assert!(!sent);
        assert!(sink.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn bad_edit_price_is_rejected() {
        let edit = RecordEdit {
            price: "free".to_string(),
            ..Default::default()
        };
        assert_eq!(
            edit.to_update(),
            Err(ValidationError::InvalidPrice("free".to_string()))
        );
    }
}
