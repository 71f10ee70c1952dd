use matrix_sdk::{
    matrix_auth::{MatrixSession, MatrixSessionTokens},
    ruma::{events::room::message::RoomMessageEventContent, OwnedDeviceId, OwnedUserId, UserId},
    Client, SessionMeta,
};
use tracing::{info, warn};
use url::Url;

use crate::{config::MatrixSettings, error::AppError, models::user::UserProfile};

/// Sends invitation notices over Matrix from a bot account. Without
/// configured credentials, or for recipients without a Matrix id, every
/// send quietly does nothing.
#[derive(Clone, Default)]
pub struct MatrixNotifier {
    settings: Option<MatrixSettings>,
}

impl MatrixNotifier {
    pub fn new(settings: Option<MatrixSettings>) -> Self {
        Self { settings }
    }

    fn is_enabled(&self) -> bool {
        self.settings
            .as_ref()
            .map(|s| !s.access_token.trim().is_empty())
            .unwrap_or(false)
    }

    pub async fn send_invite_notice(
        &self,
        recipient: &UserProfile,
        trip_name: &str,
        inviter_name: &str,
    ) -> Result<Option<String>, AppError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let Some(contact) = recipient
            .matrix_user_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            return Ok(None);
        };
        let Some(client) = self.prepare_client().await? else {
            return Ok(None);
        };
        let message = format!(
            "{inviter_name} invited you to join the trip \"{trip_name}\" on TripShare ✈️ — open the app to accept or decline."
        );
        self.notify_contact(&client, contact, &message).await
    }

    async fn prepare_client(&self) -> Result<Option<Client>, AppError> {
        let Some(settings) = &self.settings else {
            return Ok(None);
        };

        let homeserver = Url::parse(&settings.homeserver_url)
            .map_err(|err| AppError::Config(format!("invalid Matrix homeserver URL: {err}")))?;

        let client = Client::builder()
            .homeserver_url(homeserver)
            .build()
            .await
            .map_err(|err| AppError::Other(err.into()))?;

        let user_id = UserId::parse(&settings.user_id)
            .map_err(|_| AppError::Config("Matrix user id is invalid".into()))?;
        let device_id = OwnedDeviceId::try_from(settings.device_id.clone())
            .map_err(|_| AppError::Config("Matrix device id is invalid".into()))?;

        let session = MatrixSession {
            meta: SessionMeta {
                user_id: user_id.to_owned(),
                device_id,
            },
            tokens: MatrixSessionTokens {
                access_token: settings.access_token.clone(),
                refresh_token: None,
            },
        };

        client
            .restore_session(session)
            .await
            .map_err(|err| AppError::Other(err.into()))?;

        Ok(Some(client))
    }

    async fn notify_contact(
        &self,
        client: &Client,
        contact: &str,
        message: &str,
    ) -> Result<Option<String>, AppError> {
        let Ok(user_id) = OwnedUserId::try_from(contact.to_string()) else {
            warn!(contact = %contact, "Matrix contact could not be parsed");
            return Ok(None);
        };
        let room = client
            .create_dm(user_id.as_ref())
            .await
            .map_err(|err| AppError::Other(err.into()))?;
        room.send(RoomMessageEventContent::text_plain(message))
            .await
            .map_err(|err| AppError::Other(err.into()))?;
        info!(target_user = %contact, "invite notice sent");
        Ok(Some(contact.to_string()))
    }
}
