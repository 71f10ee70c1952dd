use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, NoneAsEmptyString};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MemberStatus {
    /// Entries written before the status field existed carry no status at
    /// all; those records are full members.
    #[default]
    #[serde(rename = "accepted")]
    Accepted,
    #[serde(rename = "pending")]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    #[serde(default = "default_avatar")]
    pub avatar: String,
    #[serde(default)]
    pub status: MemberStatus,
}

pub fn default_avatar() -> String {
    "https://cdn-icons-png.flaticon.com/512/149/149071.png".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub members: Vec<Member>,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    /// Builds a fresh trip with the creator as its sole, accepted member.
    /// The store assigns the document key, so `id` starts empty.
    pub fn create(draft: TripDraft, creator: Member) -> Self {
        let creator = Member {
            status: MemberStatus::Accepted,
            ..creator
        };
        Self {
            id: String::new(),
            name: draft.name.trim().to_string(),
            origin: draft.origin.trim().to_string(),
            destination: draft.destination.trim().to_string(),
            start_date: draft.start_date,
            end_date: draft.end_date,
            image_url: draft.image_url,
            creator_id: creator.id.clone(),
            members: vec![creator],
            created_at: Utc::now(),
        }
    }

    /// The leader is the creator; records written before `creator_id`
    /// existed fall back to the first member entry.
    pub fn leader_id(&self) -> &str {
        if !self.creator_id.is_empty() {
            &self.creator_id
        } else {
            self.members.first().map(|m| m.id.as_str()).unwrap_or("")
        }
    }

    /// First member entry for the identity. External data may violate the
    /// one-entry-per-identity invariant; the first match wins on reads.
    pub fn member(&self, identity: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == identity)
    }

    pub fn is_member(&self, identity: &str) -> bool {
        self.member(identity).is_some()
    }

    /// Number of calendar days the trip spans, inclusive of both ends.
    pub fn day_count(&self) -> i64 {
        (self.end_date - self.start_date).num_days().abs() + 1
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct TripDraft {
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub image_url: Option<String>,
}

impl TripDraft {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().len() < 3 {
            return Err(AppError::BadRequest(
                "trip name must be at least 3 characters".into(),
            ));
        }
        if self.origin.trim().len() < 2 {
            return Err(AppError::BadRequest(
                "origin must be at least 2 characters".into(),
            ));
        }
        if self.destination.trim().len() < 2 {
            return Err(AppError::BadRequest(
                "destination must be at least 2 characters".into(),
            ));
        }
        if self.end_date < self.start_date {
            return Err(AppError::BadRequest(
                "the trip cannot end before it starts".into(),
            ));
        }
        if self
            .origin
            .trim()
            .eq_ignore_ascii_case(self.destination.trim())
        {
            return Err(AppError::BadRequest(
                "origin and destination cannot be the same place".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft() -> TripDraft {
        TripDraft {
            name: "Rome 2026".into(),
            origin: "Madrid".into(),
            destination: "Rome".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 12).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 16).unwrap(),
            image_url: None,
        }
    }

    #[test]
    fn member_without_status_field_is_accepted() {
        let member: Member = serde_json::from_value(json!({
            "id": "u1",
            "name": "Ana",
            "avatar": "https://example.com/a.png",
        }))
        .expect("legacy member entry should deserialize");
        assert_eq!(member.status, MemberStatus::Accepted);
    }

    #[test]
    fn creator_is_sole_accepted_member() {
        let creator = Member {
            id: "u1".into(),
            name: "Ana".into(),
            avatar: default_avatar(),
            status: MemberStatus::Pending, // forced back to accepted below
        };
        let trip = Trip::create(draft(), creator);
        assert_eq!(trip.members.len(), 1);
        assert_eq!(trip.members[0].status, MemberStatus::Accepted);
        assert_eq!(trip.leader_id(), "u1");
    }

    #[test]
    fn leader_falls_back_to_first_member_when_creator_id_missing() {
        let mut trip = Trip::create(
            draft(),
            Member {
                id: "u1".into(),
                name: "Ana".into(),
                avatar: default_avatar(),
                status: MemberStatus::Accepted,
            },
        );
        trip.creator_id.clear();
        assert_eq!(trip.leader_id(), "u1");
    }

    #[test]
    fn day_count_is_inclusive() {
        let trip = Trip::create(
            draft(),
            Member {
                id: "u1".into(),
                name: "Ana".into(),
                avatar: default_avatar(),
                status: MemberStatus::Accepted,
            },
        );
        assert_eq!(trip.day_count(), 5);
    }

    #[test]
    fn draft_rejects_inverted_date_range() {
        let mut bad = draft();
        bad.end_date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(matches!(bad.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn draft_rejects_same_origin_and_destination() {
        let mut bad = draft();
        bad.destination = " madrid ".into();
        assert!(matches!(bad.validate(), Err(AppError::BadRequest(_))));
    }
}
