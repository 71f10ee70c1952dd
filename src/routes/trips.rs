use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::trip::{Member, MemberStatus, Trip, TripDraft},
    services::trips::{
        payer_name, total_expenses, Activity, ActivityDraft, Expense, ExpenseDraft,
    },
    state::AppState,
    views::TripBuckets,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(trips_list).post(trip_create))
        .route("/:id", get(trip_detail))
        .route("/:id/invite", post(member_invite))
        .route("/:id/accept", post(invite_accept))
        .route("/:id/reject", post(invite_reject))
        .route("/:id/members/:uid", delete(member_remove))
        .route("/:id/activities", get(activities_list).post(activity_add))
        .route("/:id/activities/:activity_id", delete(activity_delete))
        .route("/:id/expenses", get(expenses_list).post(expense_add))
        .route("/:id/expenses/:expense_id", delete(expense_delete))
}

const FALLBACK_IMAGE: &str =
    "https://images.unsplash.com/photo-1526481280695-3c687fd5432c?q=80&w=1200&auto=format&fit=crop";

/// How many member avatars a trip card shows before collapsing into "+N".
const VISIBLE_MEMBERS: usize = 3;

#[derive(Serialize)]
struct TripSummary {
    id: String,
    name: String,
    origin: String,
    destination: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    image_url: String,
    members: Vec<Member>,
    extra_members: usize,
}

impl From<&Trip> for TripSummary {
    fn from(trip: &Trip) -> Self {
        Self {
            id: trip.id.clone(),
            name: trip.name.clone(),
            origin: trip.origin.clone(),
            destination: trip.destination.clone(),
            start_date: trip.start_date,
            end_date: trip.end_date,
            image_url: trip
                .image_url
                .clone()
                .unwrap_or_else(|| FALLBACK_IMAGE.to_string()),
            members: trip.members.iter().take(VISIBLE_MEMBERS).cloned().collect(),
            extra_members: trip.members.len().saturating_sub(VISIBLE_MEMBERS),
        }
    }
}

#[derive(Serialize)]
struct TripListResponse {
    my_trips: Vec<TripSummary>,
    pending_trips: Vec<TripSummary>,
}

impl From<TripBuckets> for TripListResponse {
    fn from(buckets: TripBuckets) -> Self {
        Self {
            my_trips: buckets.my_trips.iter().map(TripSummary::from).collect(),
            pending_trips: buckets.pending_trips.iter().map(TripSummary::from).collect(),
        }
    }
}

async fn trips_list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<TripListResponse>, AppError> {
    let user = current.require_user()?;
    let buckets = state.membership.partitions_for(&user.uid).await?;
    Ok(Json(buckets.into()))
}

async fn trip_create(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(draft): Json<TripDraft>,
) -> Result<Json<TripSummary>, AppError> {
    let user = current.require_user()?;
    let creator = Member {
        id: user.uid.clone(),
        name: user.name.clone(),
        avatar: user.avatar.clone(),
        status: MemberStatus::Accepted,
    };
    let trip = state.membership.create_trip(draft, creator).await?;
    Ok(Json(TripSummary::from(&trip)))
}

#[derive(Serialize)]
struct TripDetail {
    #[serde(flatten)]
    summary: TripSummary,
    all_members: Vec<Member>,
    days: Vec<u32>,
    is_leader: bool,
    my_status: MemberStatus,
}

/// Loads the trip and checks the caller has an entry on it. Outsiders get
/// the same answer as for a trip that does not exist.
async fn load_for_member(
    state: &AppState,
    current: &CurrentUser,
    trip_id: &str,
) -> Result<(Trip, String), AppError> {
    let user = current.require_user()?;
    let trip = state.membership.load_trip(trip_id).await?;
    if !trip.is_member(&user.uid) {
        return Err(AppError::NotFound);
    }
    Ok((trip, user.uid.clone()))
}

async fn trip_detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<Json<TripDetail>, AppError> {
    let (trip, uid) = load_for_member(&state, &current, &trip_id).await?;
    let my_status = trip
        .member(&uid)
        .map(|m| m.status)
        .unwrap_or(MemberStatus::Accepted);
    Ok(Json(TripDetail {
        summary: TripSummary::from(&trip),
        all_members: trip.members.clone(),
        days: (1..=trip.day_count() as u32).collect(),
        is_leader: trip.leader_id() == uid,
        my_status,
    }))
}

#[derive(Deserialize)]
struct InviteForm {
    uid: String,
}

async fn member_invite(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Json(form): Json<InviteForm>,
) -> Result<Json<TripDetail>, AppError> {
    let user = current.require_user()?;
    // The invite picker only offers friends; the API enforces the same.
    let me = state.friends.profile(&user.uid).await?;
    if !me.is_friend(&form.uid) {
        return Err(AppError::BadRequest(
            "you can only invite your friends".into(),
        ));
    }
    let candidate = state.friends.profile(&form.uid).await?.as_member();
    let trip = state.membership.invite(&trip_id, &user.uid, candidate).await?;
    let my_status = trip
        .member(&user.uid)
        .map(|m| m.status)
        .unwrap_or(MemberStatus::Accepted);
    Ok(Json(TripDetail {
        all_members: trip.members.clone(),
        days: (1..=trip.day_count() as u32).collect(),
        is_leader: trip.leader_id() == user.uid,
        my_status,
        summary: TripSummary::from(&trip),
    }))
}

async fn invite_accept(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<Json<TripSummary>, AppError> {
    let user = current.require_user()?;
    let trip = state.membership.accept(&trip_id, &user.uid).await?;
    Ok(Json(TripSummary::from(&trip)))
}

async fn invite_reject(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = current.require_user()?;
    state.membership.reject(&trip_id, &user.uid).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn member_remove(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, member_uid)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = current.require_user()?;
    state
        .membership
        .remove(&trip_id, &user.uid, &member_uid)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn activities_list(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<Json<Vec<Activity>>, AppError> {
    load_for_member(&state, &current, &trip_id).await?;
    Ok(Json(state.trips.activities_for(&trip_id).await?))
}

#[derive(Deserialize)]
struct ActivityForm {
    day: u32,
    #[serde(flatten)]
    draft: ActivityDraft,
}

async fn activity_add(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Json(form): Json<ActivityForm>,
) -> Result<Json<Activity>, AppError> {
    load_for_member(&state, &current, &trip_id).await?;
    let activity = state.trips.add_activity(&trip_id, form.day, form.draft).await?;
    Ok(Json(activity))
}

async fn activity_delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, activity_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    load_for_member(&state, &current, &trip_id).await?;
    state.trips.delete_activity(&trip_id, &activity_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Serialize)]
struct ExpenseView {
    #[serde(flatten)]
    expense: Expense,
    payer_name: String,
}

#[derive(Serialize)]
struct ExpenseListResponse {
    expenses: Vec<ExpenseView>,
    total: f64,
}

async fn expenses_list(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<Json<ExpenseListResponse>, AppError> {
    let (trip, _) = load_for_member(&state, &current, &trip_id).await?;
    let expenses = state.trips.expenses_for(&trip_id).await?;
    let total = total_expenses(&expenses);
    let views = expenses
        .into_iter()
        .map(|expense| ExpenseView {
            payer_name: payer_name(&trip, &expense.payer_id),
            expense,
        })
        .collect();
    Ok(Json(ExpenseListResponse {
        expenses: views,
        total,
    }))
}

async fn expense_add(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Json(draft): Json<ExpenseDraft>,
) -> Result<Json<Expense>, AppError> {
    load_for_member(&state, &current, &trip_id).await?;
    let expense = state.trips.add_expense(&trip_id, draft).await?;
    Ok(Json(expense))
}

async fn expense_delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, expense_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    load_for_member(&state, &current, &trip_id).await?;
    state.trips.delete_expense(&trip_id, &expense_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
