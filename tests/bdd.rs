use std::{collections::HashMap, fmt, net::SocketAddr, time::Duration};

use anyhow::Context;
use chrono::NaiveDate;
use cucumber::{given, then, when, World as _};
use std::sync::Arc;
use tempfile::TempDir;
use tripshare::{
    auth::{self, AuthenticatedUser},
    config::AppConfig,
    error::AppError,
    services::notify::MatrixNotifier,
    state::AppState,
    store::json::JsonStore,
};

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    users: HashMap<String, AuthenticatedUser>,
    trip_id: Option<String>,
    last_request_id: Option<String>,
    last_error: Option<AppError>,
}

impl AppWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn uid(&self, name: &str) -> String {
        self.users
            .get(name)
            .unwrap_or_else(|| panic!("user {name} must be registered first"))
            .uid
            .clone()
    }

    fn trip_id(&self) -> String {
        self.trip_id.clone().expect("a trip must be created first")
    }
}

struct TestState {
    app: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let data_root = root.path().join("data");

        let config = AppConfig {
            data_root: data_root.clone(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cookie_secret: "bdd-cookie-secret".into(),
            matrix: None,
            write_retries: 2,
            write_timeout: Duration::from_secs(2),
        };

        let store = Arc::new(JsonStore::open(data_root).await?);
        let app = AppState::new(config, store, MatrixNotifier::default());
        Ok(Self { app, _root: root })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.users.clear();
    world.trip_id = None;
    world.last_request_id = None;
    world.last_error = None;
}

#[given(
    regex = r#"^a registered user \"([^\"]+)\" with email \"([^\"]+)\" and password \"([^\"]+)\"$"#
)]
async fn given_registered_user(
    world: &mut AppWorld,
    username: String,
    email: String,
    password: String,
) {
    let user = auth::register_user(world.app_state(), &username, &email, &password)
        .await
        .expect("register user");
    world.users.insert(username, user);
}

#[given(regex = r#"^\"([^\"]+)\" and \"([^\"]+)\" are friends$"#)]
async fn given_friendship(world: &mut AppWorld, first: String, second: String) {
    let from = world.uid(&first);
    let to = world.uid(&second);
    let state = world.app_state();
    let sender = state.friends.profile(&from).await.expect("sender profile");
    let request = state
        .friends
        .send_request(&sender, &to)
        .await
        .expect("send friend request");
    state
        .friends
        .accept_request(&to, &request.id)
        .await
        .expect("accept friend request");
}

#[when(regex = r#"^\"([^\"]+)\" creates a trip \"([^\"]+)\" from \"([^\"]+)\" to \"([^\"]+)\"$"#)]
async fn when_create_trip(
    world: &mut AppWorld,
    username: String,
    name: String,
    origin: String,
    destination: String,
) {
    let uid = world.uid(&username);
    let state = world.app_state();
    let creator = state
        .friends
        .profile(&uid)
        .await
        .expect("creator profile")
        .as_member();
    let draft = tripshare::models::trip::TripDraft {
        name,
        origin,
        destination,
        start_date: NaiveDate::from_ymd_opt(2026, 3, 12).expect("valid date"),
        end_date: NaiveDate::from_ymd_opt(2026, 3, 16).expect("valid date"),
        image_url: None,
    };
    let trip = state
        .membership
        .create_trip(draft, creator)
        .await
        .expect("create trip");
    world.trip_id = Some(trip.id);
}

#[when(regex = r#"^\"([^\"]+)\" invites \"([^\"]+)\" to the trip$"#)]
async fn when_invite(world: &mut AppWorld, inviter: String, invitee: String) {
    let inviter_uid = world.uid(&inviter);
    let invitee_uid = world.uid(&invitee);
    let trip_id = world.trip_id();
    let state = world.app_state();
    let candidate = state
        .friends
        .profile(&invitee_uid)
        .await
        .expect("invitee profile")
        .as_member();
    match state.membership.invite(&trip_id, &inviter_uid, candidate).await {
        Ok(_) => world.last_error = None,
        Err(err) => world.last_error = Some(err),
    }
}

#[when(regex = r#"^\"([^\"]+)\" accepts the invitation$"#)]
async fn when_accept(world: &mut AppWorld, username: String) {
    let uid = world.uid(&username);
    let trip_id = world.trip_id();
    world
        .app_state()
        .membership
        .accept(&trip_id, &uid)
        .await
        .expect("accept invitation");
}

#[when(regex = r#"^\"([^\"]+)\" rejects the invitation$"#)]
async fn when_reject(world: &mut AppWorld, username: String) {
    let uid = world.uid(&username);
    let trip_id = world.trip_id();
    world
        .app_state()
        .membership
        .reject(&trip_id, &uid)
        .await
        .expect("reject invitation");
}

#[when(regex = r#"^\"([^\"]+)\" removes \"([^\"]+)\" from the trip$"#)]
async fn when_remove(world: &mut AppWorld, actor: String, target: String) {
    let actor_uid = world.uid(&actor);
    let target_uid = world.uid(&target);
    let trip_id = world.trip_id();
    match world
        .app_state()
        .membership
        .remove(&trip_id, &actor_uid, &target_uid)
        .await
    {
        Ok(()) => world.last_error = None,
        Err(err) => world.last_error = Some(err),
    }
}

#[then(regex = r"^the trip has (\d+) members?$")]
async fn then_member_count(world: &mut AppWorld, expected: usize) {
    let trip_id = world.trip_id();
    let trip = world
        .app_state()
        .membership
        .load_trip(&trip_id)
        .await
        .expect("load trip");
    assert_eq!(trip.members.len(), expected);
}

#[then(regex = r#"^the member \"([^\"]+)\" has status \"([^\"]+)\"$"#)]
async fn then_member_status(world: &mut AppWorld, username: String, status: String) {
    let uid = world.uid(&username);
    let trip_id = world.trip_id();
    let trip = world
        .app_state()
        .membership
        .load_trip(&trip_id)
        .await
        .expect("load trip");
    let member = trip.member(&uid).expect("member entry expected");
    let actual = match member.status {
        tripshare::models::trip::MemberStatus::Accepted => "accepted",
        tripshare::models::trip::MemberStatus::Pending => "pending",
    };
    assert_eq!(actual, status);
}

#[then(regex = r#"^\"([^\"]+)\" sees the trip under (my trips|pending invites)$"#)]
async fn then_sees_bucket(world: &mut AppWorld, username: String, bucket: String) {
    let uid = world.uid(&username);
    let trip_id = world.trip_id();
    let buckets = world
        .app_state()
        .membership
        .partitions_for(&uid)
        .await
        .expect("partition trips");
    let list = if bucket == "my trips" {
        &buckets.my_trips
    } else {
        &buckets.pending_trips
    };
    assert!(list.iter().any(|t| t.id == trip_id));
}

#[then(regex = r#"^\"([^\"]+)\" does not see the trip under (my trips|pending invites)$"#)]
async fn then_does_not_see_bucket(world: &mut AppWorld, username: String, bucket: String) {
    let uid = world.uid(&username);
    let trip_id = world.trip_id();
    let buckets = world
        .app_state()
        .membership
        .partitions_for(&uid)
        .await
        .expect("partition trips");
    let list = if bucket == "my trips" {
        &buckets.my_trips
    } else {
        &buckets.pending_trips
    };
    assert!(list.iter().all(|t| t.id != trip_id));
}

#[then("the last action is refused as not allowed")]
async fn then_refused(world: &mut AppWorld) {
    assert!(
        matches!(world.last_error, Some(AppError::NotAuthorized)),
        "expected NotAuthorized, got {:?}",
        world.last_error
    );
}

#[then("the last action reports an existing member")]
async fn then_already_member(world: &mut AppWorld) {
    assert!(
        matches!(world.last_error, Some(AppError::AlreadyMember(_))),
        "expected AlreadyMember, got {:?}",
        world.last_error
    );
}

#[when(regex = r#"^\"([^\"]+)\" sends a friend request to \"([^\"]+)\"$"#)]
async fn when_send_request(world: &mut AppWorld, from: String, to: String) {
    let from_uid = world.uid(&from);
    let to_uid = world.uid(&to);
    let state = world.app_state();
    let sender = state.friends.profile(&from_uid).await.expect("sender profile");
    let request = state
        .friends
        .send_request(&sender, &to_uid)
        .await
        .expect("send friend request");
    world.last_request_id = Some(request.id);
}

#[when(regex = r#"^\"([^\"]+)\" accepts the friend request$"#)]
async fn when_accept_request(world: &mut AppWorld, username: String) {
    let uid = world.uid(&username);
    let request_id = world
        .last_request_id
        .clone()
        .expect("a friend request must be sent first");
    world
        .app_state()
        .friends
        .accept_request(&uid, &request_id)
        .await
        .expect("accept friend request");
}

#[when(regex = r#"^\"([^\"]+)\" rejects the friend request$"#)]
async fn when_reject_request(world: &mut AppWorld, username: String) {
    let uid = world.uid(&username);
    let request_id = world
        .last_request_id
        .clone()
        .expect("a friend request must be sent first");
    world
        .app_state()
        .friends
        .reject_request(&uid, &request_id)
        .await
        .expect("reject friend request");
}

#[then(regex = r#"^\"([^\"]+)\" has (\d+) incoming friend requests?$"#)]
async fn then_incoming_count(world: &mut AppWorld, username: String, expected: usize) {
    let uid = world.uid(&username);
    let requests = world
        .app_state()
        .friends
        .incoming_requests(&uid)
        .await
        .expect("list incoming requests");
    assert_eq!(requests.len(), expected);
}

#[then(regex = r#"^\"([^\"]+)\" and \"([^\"]+)\" are listed as friends$"#)]
async fn then_are_friends(world: &mut AppWorld, first: String, second: String) {
    let first_uid = world.uid(&first);
    let second_uid = world.uid(&second);
    let state = world.app_state();
    let first_profile = state.friends.profile(&first_uid).await.expect("profile");
    let second_profile = state.friends.profile(&second_uid).await.expect("profile");
    assert!(first_profile.is_friend(&second_uid));
    assert!(second_profile.is_friend(&first_uid));
}

#[then(regex = r#"^\"([^\"]+)\" and \"([^\"]+)\" are not friends$"#)]
async fn then_not_friends(world: &mut AppWorld, first: String, second: String) {
    let first_uid = world.uid(&first);
    let second_uid = world.uid(&second);
    let state = world.app_state();
    let first_profile = state.friends.profile(&first_uid).await.expect("profile");
    let second_profile = state.friends.profile(&second_uid).await.expect("profile");
    assert!(!first_profile.is_friend(&second_uid));
    assert!(!second_profile.is_friend(&first_uid));
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
