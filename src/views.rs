//! Derived trip views. A pure fold over the latest snapshot: no hidden
//! state, so recomputing on every change notification is free of side
//! effects and safe to repeat.

use serde::Serialize;

use crate::models::trip::{MemberStatus, Trip};

#[derive(Debug, Clone, Default, Serialize)]
pub struct TripBuckets {
    pub my_trips: Vec<Trip>,
    pub pending_trips: Vec<Trip>,
}

/// Splits the full trip list for one identity: trips where the identity is
/// an accepted member (the creator's legacy entries have no status and count
/// as accepted) versus trips where its entry is still pending. Trips with no
/// entry for the identity land in neither bucket. Input order is preserved;
/// callers supply trips ordered by creation time, newest first.
pub fn partition_trips(trips: &[Trip], identity: &str) -> TripBuckets {
    let mut buckets = TripBuckets::default();
    for trip in trips {
        // The first matching entry decides the bucket. Duplicate entries
        // violate the write-time invariant but may exist in external data.
        match trip.member(identity).map(|m| m.status) {
            Some(MemberStatus::Accepted) => buckets.my_trips.push(trip.clone()),
            Some(MemberStatus::Pending) => buckets.pending_trips.push(trip.clone()),
            None => {}
        }
    }
    buckets
}
