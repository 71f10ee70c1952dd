//! Itinerary and expense records hanging off a trip. These are plain
//! documents keyed to the trip id; the membership rules live in
//! `membership`, not here.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::AppError,
    models::trip::Trip,
    services::retry::{retry_write, RetryConfig},
    store::{encode, DocumentStore, Query, Snapshot},
};

const TRIPS: &str = "trips";
const ACTIVITIES: &str = "activities";
const EXPENSES: &str = "expenses";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub id: String,
    pub trip_id: String,
    pub title: String,
    /// Wall-clock label like "09:00"; ordering is lexicographic.
    pub time: String,
    pub kind: String,
    #[serde(default)]
    pub description: String,
    pub day: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityDraft {
    pub title: String,
    pub time: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

fn default_kind() -> String {
    "sightseeing".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    #[serde(default)]
    pub id: String,
    pub trip_id: String,
    pub title: String,
    pub amount: f64,
    pub payer_id: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseDraft {
    pub title: String,
    pub amount: f64,
    pub payer_id: String,
    pub date: NaiveDate,
}

#[derive(Clone)]
pub struct TripService {
    store: Arc<dyn DocumentStore>,
    retry: RetryConfig,
}

impl TripService {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    async fn ensure_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        self.store
            .get(TRIPS, trip_id)
            .await?
            .ok_or(AppError::NotFound)?
            .decode()
    }

    pub async fn add_activity(
        &self,
        trip_id: &str,
        day: u32,
        draft: ActivityDraft,
    ) -> Result<Activity, AppError> {
        if draft.title.trim().is_empty() {
            return Err(AppError::BadRequest("activity title is required".into()));
        }
        if draft.time.trim().is_empty() {
            return Err(AppError::BadRequest("activity time is required".into()));
        }
        let trip = self.ensure_trip(trip_id).await?;
        if day == 0 || i64::from(day) > trip.day_count() {
            return Err(AppError::BadRequest(format!(
                "day {day} is outside this trip"
            )));
        }

        let mut activity = Activity {
            id: String::new(),
            trip_id: trip_id.to_string(),
            title: draft.title.trim().to_string(),
            time: draft.time.trim().to_string(),
            kind: draft.kind,
            description: draft.description,
            day,
            created_at: Utc::now(),
        };
        let mut fields = encode(&activity)?;
        if let Some(obj) = fields.as_object_mut() {
            obj.remove("id");
        }
        let doc = retry_write(&self.retry, || self.store.add(ACTIVITIES, fields.clone())).await?;
        activity.id = doc.id;
        info!(trip = %trip_id, day, "activity added");
        Ok(activity)
    }

    pub async fn activities_for(&self, trip_id: &str) -> Result<Vec<Activity>, AppError> {
        let query = Query::collection(ACTIVITIES)
            .filter("trip_id", trip_id)
            .order_by_asc("time");
        let docs = self.store.query(&query).await?;
        Ok(Snapshot { docs }.decode_all())
    }

    pub async fn delete_activity(&self, trip_id: &str, activity_id: &str) -> Result<(), AppError> {
        let Some(doc) = self.store.get(ACTIVITIES, activity_id).await? else {
            return Ok(()); // already gone
        };
        let activity: Activity = doc.decode()?;
        if activity.trip_id != trip_id {
            return Err(AppError::NotFound);
        }
        retry_write(&self.retry, || self.store.delete(ACTIVITIES, activity_id)).await
    }

    pub async fn add_expense(
        &self,
        trip_id: &str,
        draft: ExpenseDraft,
    ) -> Result<Expense, AppError> {
        if draft.title.trim().is_empty() {
            return Err(AppError::BadRequest("expense title is required".into()));
        }
        if draft.amount < 0.01 {
            return Err(AppError::BadRequest(
                "expense amount must be at least 0.01".into(),
            ));
        }
        let trip = self.ensure_trip(trip_id).await?;
        if !trip.is_member(&draft.payer_id) {
            return Err(AppError::BadRequest(
                "the payer must be a trip member".into(),
            ));
        }

        let mut expense = Expense {
            id: String::new(),
            trip_id: trip_id.to_string(),
            title: draft.title.trim().to_string(),
            amount: draft.amount,
            payer_id: draft.payer_id,
            date: draft.date,
            created_at: Utc::now(),
        };
        let mut fields = encode(&expense)?;
        if let Some(obj) = fields.as_object_mut() {
            obj.remove("id");
        }
        let doc = retry_write(&self.retry, || self.store.add(EXPENSES, fields.clone())).await?;
        expense.id = doc.id;
        info!(trip = %trip_id, amount = expense.amount, "expense added");
        Ok(expense)
    }

    pub async fn expenses_for(&self, trip_id: &str) -> Result<Vec<Expense>, AppError> {
        let query = Query::collection(EXPENSES)
            .filter("trip_id", trip_id)
            .order_by_desc("date");
        let docs = self.store.query(&query).await?;
        Ok(Snapshot { docs }.decode_all())
    }

    pub async fn delete_expense(&self, trip_id: &str, expense_id: &str) -> Result<(), AppError> {
        let Some(doc) = self.store.get(EXPENSES, expense_id).await? else {
            return Ok(());
        };
        let expense: Expense = doc.decode()?;
        if expense.trip_id != trip_id {
            return Err(AppError::NotFound);
        }
        retry_write(&self.retry, || self.store.delete(EXPENSES, expense_id)).await
    }
}

pub fn total_expenses(expenses: &[Expense]) -> f64 {
    expenses.iter().map(|e| e.amount).sum()
}

/// Display name for a payer, resolved against the member list.
pub fn payer_name(trip: &Trip, payer_id: &str) -> String {
    trip.member(payer_id)
        .map(|m| m.name.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}
