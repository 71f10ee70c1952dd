//! Trip membership engine: who may invite, how a pending entry becomes an
//! accepted one, and who may remove whom. The transition rules are pure
//! functions over a `Trip`; the service applies their outcome to the
//! document store and fans the side effects out.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::{
        trip::{Member, MemberStatus, Trip, TripDraft},
        user::UserProfile,
    },
    services::{
        notify::MatrixNotifier,
        retry::{retry_write, RetryConfig},
    },
    store::{encode, Document, DocumentStore, Query, Snapshot},
    views::{partition_trips, TripBuckets},
};

pub const TRIPS: &str = "trips";
const USERS: &str = "users";

/// Decides whether `inviter` may add `candidate` and returns the pending
/// entry to append. Only the leader invites, and an identity that already
/// has an entry of any status cannot be invited again.
pub fn plan_invite(trip: &Trip, inviter: &str, candidate: Member) -> Result<Member, AppError> {
    if inviter != trip.leader_id() {
        return Err(AppError::NotAuthorized);
    }
    if trip.is_member(&candidate.id) {
        return Err(AppError::AlreadyMember(candidate.name));
    }
    Ok(Member {
        status: MemberStatus::Pending,
        ..candidate
    })
}

/// Member list with the identity's pending entry flipped to accepted, or
/// `None` when there is nothing to accept (which callers treat as a no-op).
pub fn plan_accept(trip: &Trip, identity: &str) -> Option<Vec<Member>> {
    if trip.member(identity)?.status != MemberStatus::Pending {
        return None;
    }
    Some(
        trip.members
            .iter()
            .map(|m| {
                if m.id == identity {
                    Member {
                        status: MemberStatus::Accepted,
                        ..m.clone()
                    }
                } else {
                    m.clone()
                }
            })
            .collect(),
    )
}

/// The pending entry the invitee wants to withdraw, or `None` when it is
/// already gone. Rejecting twice must stay a no-op.
pub fn plan_reject(trip: &Trip, identity: &str) -> Option<Member> {
    trip.member(identity)
        .filter(|m| m.status == MemberStatus::Pending)
        .cloned()
}

/// The entry the leader wants removed. Non-leaders are refused; a missing
/// target is recoverable feedback, not a crash.
pub fn plan_remove(trip: &Trip, actor: &str, identity: &str) -> Result<Member, AppError> {
    if actor != trip.leader_id() {
        return Err(AppError::NotAuthorized);
    }
    trip.member(identity).cloned().ok_or(AppError::NotFound)
}

#[derive(Clone)]
pub struct MembershipService {
    store: Arc<dyn DocumentStore>,
    notifier: MatrixNotifier,
    retry: RetryConfig,
}

impl MembershipService {
    pub fn new(store: Arc<dyn DocumentStore>, notifier: MatrixNotifier, retry: RetryConfig) -> Self {
        Self {
            store,
            notifier,
            retry,
        }
    }

    pub async fn create_trip(&self, draft: TripDraft, creator: Member) -> Result<Trip, AppError> {
        draft.validate()?;
        let mut trip = Trip::create(draft, creator);
        let mut fields = encode(&trip)?;
        if let Some(obj) = fields.as_object_mut() {
            obj.remove("id");
        }
        let doc = retry_write(&self.retry, || self.store.add(TRIPS, fields.clone())).await?;
        trip.id = doc.id;
        info!(trip = %trip.id, name = %trip.name, "trip created");
        Ok(trip)
    }

    pub async fn load_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        self.load_trip_doc(trip_id).await.map(|(_, trip)| trip)
    }

    async fn load_trip_doc(&self, trip_id: &str) -> Result<(Document, Trip), AppError> {
        let doc = self
            .store
            .get(TRIPS, trip_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let trip = doc.decode::<Trip>()?;
        Ok((doc, trip))
    }

    fn trips_query() -> Query {
        Query::collection(TRIPS).order_by_desc("created_at")
    }

    pub async fn list_trips(&self) -> Result<Vec<Trip>, AppError> {
        let docs = self.store.query(&Self::trips_query()).await?;
        Ok(Snapshot { docs }.decode_all())
    }

    pub async fn partitions_for(&self, identity: &str) -> Result<TripBuckets, AppError> {
        Ok(partition_trips(&self.list_trips().await?, identity))
    }

    /// Live view of the identity's buckets. Every store change triggers a
    /// full, pure recomputation from the latest snapshot, so repeated
    /// notifications can never corrupt the derived state.
    pub async fn watch_partitions(&self, identity: String) -> watch::Receiver<TripBuckets> {
        let mut snapshots = self.store.subscribe(Self::trips_query()).await;
        let initial = partition_trips(&snapshots.borrow().decode_all::<Trip>(), &identity);
        let (tx, rx) = watch::channel(initial);
        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                let buckets = partition_trips(&snapshot.decode_all::<Trip>(), &identity);
                if tx.send(buckets).is_err() {
                    break;
                }
            }
        });
        rx
    }

    pub async fn invite(
        &self,
        trip_id: &str,
        inviter: &str,
        candidate: Member,
    ) -> Result<Trip, AppError> {
        let (_, trip) = self.load_trip_doc(trip_id).await?;
        let pending = plan_invite(&trip, inviter, candidate)?;
        let entry = encode(&pending)?;
        retry_write(&self.retry, || {
            self.store
                .array_union(TRIPS, trip_id, "members", vec![entry.clone()])
        })
        .await?;
        info!(trip = %trip_id, invitee = %pending.id, "invitation recorded");
        self.notify_invitee(&trip, &pending, inviter).await;
        self.load_trip(trip_id).await
    }

    pub async fn accept(&self, trip_id: &str, identity: &str) -> Result<Trip, AppError> {
        let (_, trip) = self.load_trip_doc(trip_id).await?;
        if let Some(members) = plan_accept(&trip, identity) {
            // One field update replaces the whole list, so there is no
            // window where the entry exists in neither state.
            let fields = json!({ "members": encode(&members)? });
            retry_write(&self.retry, || {
                self.store.update(TRIPS, trip_id, fields.clone())
            })
            .await?;
            info!(trip = %trip_id, member = %identity, "invitation accepted");
        }
        self.load_trip(trip_id).await
    }

    pub async fn reject(&self, trip_id: &str, identity: &str) -> Result<(), AppError> {
        let (doc, trip) = self.load_trip_doc(trip_id).await?;
        let Some(entry) = plan_reject(&trip, identity) else {
            return Ok(());
        };
        let raw = raw_member_value(&doc, &entry.id).unwrap_or(encode(&entry)?);
        retry_write(&self.retry, || {
            self.store
                .array_remove(TRIPS, trip_id, "members", vec![raw.clone()])
        })
        .await?;
        info!(trip = %trip_id, member = %identity, "invitation rejected");
        Ok(())
    }

    pub async fn remove(
        &self,
        trip_id: &str,
        actor: &str,
        identity: &str,
    ) -> Result<(), AppError> {
        let (doc, trip) = self.load_trip_doc(trip_id).await?;
        let target = plan_remove(&trip, actor, identity)?;
        let raw = raw_member_value(&doc, &target.id).unwrap_or(encode(&target)?);
        retry_write(&self.retry, || {
            self.store
                .array_remove(TRIPS, trip_id, "members", vec![raw.clone()])
        })
        .await?;
        info!(trip = %trip_id, member = %identity, actor = %actor, "member removed");
        Ok(())
    }

    /// Best effort: a failed notice must never fail the invite itself.
    async fn notify_invitee(&self, trip: &Trip, invitee: &Member, inviter: &str) {
        let inviter_name = trip
            .member(inviter)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| inviter.to_string());
        let profile = match self.store.get(USERS, &invitee.id).await {
            Ok(Some(doc)) => match doc.decode::<UserProfile>() {
                Ok(profile) => profile,
                Err(err) => {
                    warn!(invitee = %invitee.id, "cannot decode invitee profile: {err}");
                    return;
                }
            },
            Ok(None) => return,
            Err(err) => {
                warn!(invitee = %invitee.id, "cannot load invitee profile: {err}");
                return;
            }
        };
        if let Err(err) = self
            .notifier
            .send_invite_notice(&profile, &trip.name, &inviter_name)
            .await
        {
            warn!(invitee = %invitee.id, "invite notice failed: {err}");
        }
    }
}

/// The member entry exactly as stored, found by identity. Removing the raw
/// value keeps array-remove working for legacy entries that predate the
/// status field.
fn raw_member_value(doc: &Document, identity: &str) -> Option<Value> {
    doc.fields
        .get("members")?
        .as_array()?
        .iter()
        .find(|entry| entry.get("id").and_then(Value::as_str) == Some(identity))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::default_avatar;
    use crate::store::json::JsonStore;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn member(id: &str, name: &str) -> Member {
        Member {
            id: id.into(),
            name: name.into(),
            avatar: default_avatar(),
            status: MemberStatus::Accepted,
        }
    }

    fn draft(name: &str) -> TripDraft {
        TripDraft {
            name: name.into(),
            origin: "Madrid".into(),
            destination: "Rome".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 12).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 16).unwrap(),
            image_url: None,
        }
    }

    fn service() -> MembershipService {
        let retry = RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryConfig::DEFAULT
        };
        MembershipService::new(
            Arc::new(JsonStore::in_memory()),
            MatrixNotifier::default(),
            retry,
        )
    }

    fn sample_trip() -> Trip {
        Trip::create(draft("Rome 2026"), member("u1", "Ana"))
    }

    #[test]
    fn non_leader_cannot_invite() {
        let trip = sample_trip();
        let err = plan_invite(&trip, "u2", member("u3", "Luis")).unwrap_err();
        assert!(matches!(err, AppError::NotAuthorized));
    }

    #[test]
    fn duplicate_invite_is_reported_without_mutation() {
        let mut trip = sample_trip();
        trip.members.push(Member {
            status: MemberStatus::Pending,
            ..member("u2", "Luis")
        });
        let err = plan_invite(&trip, "u1", member("u2", "Luis")).unwrap_err();
        assert!(matches!(err, AppError::AlreadyMember(_)));
        assert_eq!(trip.members.len(), 2);
    }

    #[test]
    fn accept_without_a_pending_entry_is_a_no_op() {
        let trip = sample_trip();
        assert!(plan_accept(&trip, "u1").is_none()); // already accepted
        assert!(plan_accept(&trip, "u2").is_none()); // never invited
    }

    #[test]
    fn non_leader_cannot_remove() {
        let trip = sample_trip();
        let err = plan_remove(&trip, "u2", "u1").unwrap_err();
        assert!(matches!(err, AppError::NotAuthorized));
    }

    #[test]
    fn removing_an_absent_member_reports_not_found() {
        let trip = sample_trip();
        let err = plan_remove(&trip, "u1", "u9").unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn invite_then_accept_moves_the_trip_between_buckets() {
        let service = service();
        let trip = service
            .create_trip(draft("Rome 2026"), member("u1", "Ana"))
            .await
            .unwrap();

        let after_invite = service
            .invite(&trip.id, "u1", member("u2", "Luis"))
            .await
            .unwrap();
        assert_eq!(after_invite.members.len(), 2);
        assert_eq!(after_invite.member("u2").unwrap().status, MemberStatus::Pending);

        let buckets = service.partitions_for("u2").await.unwrap();
        assert!(buckets.my_trips.is_empty());
        assert_eq!(buckets.pending_trips.len(), 1);

        let after_accept = service.accept(&trip.id, "u2").await.unwrap();
        assert_eq!(after_accept.member("u2").unwrap().status, MemberStatus::Accepted);

        let buckets = service.partitions_for("u2").await.unwrap();
        assert_eq!(buckets.my_trips.len(), 1);
        assert!(buckets.pending_trips.is_empty());
    }

    #[tokio::test]
    async fn non_leader_invite_leaves_the_member_list_unchanged() {
        let service = service();
        let trip = service
            .create_trip(draft("Rome 2026"), member("u1", "Ana"))
            .await
            .unwrap();
        service.invite(&trip.id, "u1", member("u2", "Luis")).await.unwrap();
        service.accept(&trip.id, "u2").await.unwrap();

        let err = service
            .invite(&trip.id, "u2", member("u3", "Mar"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotAuthorized));

        let reloaded = service.load_trip(&trip.id).await.unwrap();
        assert_eq!(reloaded.members.len(), 2);
    }

    #[tokio::test]
    async fn reject_is_idempotent() {
        let service = service();
        let trip = service
            .create_trip(draft("Rome 2026"), member("u1", "Ana"))
            .await
            .unwrap();
        service.invite(&trip.id, "u1", member("u2", "Luis")).await.unwrap();

        service.reject(&trip.id, "u2").await.unwrap();
        service.reject(&trip.id, "u2").await.unwrap();

        let reloaded = service.load_trip(&trip.id).await.unwrap();
        assert_eq!(reloaded.members.len(), 1);
        assert!(!reloaded.is_member("u2"));
    }

    #[tokio::test]
    async fn no_operation_sequence_produces_duplicate_identities() {
        let service = service();
        let trip = service
            .create_trip(draft("Rome 2026"), member("u1", "Ana"))
            .await
            .unwrap();

        service.invite(&trip.id, "u1", member("u2", "Luis")).await.unwrap();
        let _ = service.invite(&trip.id, "u1", member("u2", "Luis")).await;
        service.accept(&trip.id, "u2").await.unwrap();
        let _ = service.invite(&trip.id, "u1", member("u2", "Luis")).await;
        service.invite(&trip.id, "u1", member("u3", "Mar")).await.unwrap();
        service.reject(&trip.id, "u3").await.unwrap();
        let _ = service.remove(&trip.id, "u1", "u3").await;

        let reloaded = service.load_trip(&trip.id).await.unwrap();
        for entry in &reloaded.members {
            let occurrences = reloaded
                .members
                .iter()
                .filter(|other| other.id == entry.id)
                .count();
            assert_eq!(occurrences, 1, "duplicate entry for {}", entry.id);
        }
    }

    #[tokio::test]
    async fn leader_can_remove_an_accepted_member() {
        let service = service();
        let trip = service
            .create_trip(draft("Rome 2026"), member("u1", "Ana"))
            .await
            .unwrap();
        service.invite(&trip.id, "u1", member("u2", "Luis")).await.unwrap();
        service.accept(&trip.id, "u2").await.unwrap();

        let err = service.remove(&trip.id, "u2", "u1").await.unwrap_err();
        assert!(matches!(err, AppError::NotAuthorized));

        service.remove(&trip.id, "u1", "u2").await.unwrap();
        let reloaded = service.load_trip(&trip.id).await.unwrap();
        assert!(!reloaded.is_member("u2"));
    }

    #[tokio::test]
    async fn watched_partitions_recompute_after_each_change() {
        let service = service();
        let trip = service
            .create_trip(draft("Rome 2026"), member("u1", "Ana"))
            .await
            .unwrap();
        service.invite(&trip.id, "u1", member("u2", "Luis")).await.unwrap();

        let mut buckets = service.watch_partitions("u2".to_string()).await;
        assert_eq!(buckets.borrow().pending_trips.len(), 1);

        service.accept(&trip.id, "u2").await.unwrap();
        buckets.changed().await.unwrap();
        let latest = buckets.borrow_and_update().clone();
        assert_eq!(latest.my_trips.len(), 1);
        assert!(latest.pending_trips.is_empty());
    }
}
