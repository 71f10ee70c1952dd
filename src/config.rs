use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_root: PathBuf,
    pub listen_addr: SocketAddr,
    pub cookie_secret: String,
    pub matrix: Option<MatrixSettings>,
    pub write_retries: u32,
    pub write_timeout: Duration,
}

/// Credentials for the bot account used to notify invited users.
#[derive(Debug, Clone)]
pub struct MatrixSettings {
    pub homeserver_url: String,
    pub user_id: String,
    pub device_id: String,
    pub access_token: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let data_root = env::var("DATA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let cookie_secret = env::var("COOKIE_SECRET")
            .unwrap_or_else(|_| "change-me-super-secret-tripshare-cookie".to_string());

        let matrix = match env::var("MATRIX_ACCESS_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Some(MatrixSettings {
                homeserver_url: env::var("MATRIX_HOMESERVER_URL")
                    .unwrap_or_else(|_| "https://matrix.org".to_string()),
                user_id: env::var("MATRIX_USER_ID").map_err(|_| {
                    AppError::Config("MATRIX_ACCESS_TOKEN set but MATRIX_USER_ID missing".into())
                })?,
                device_id: env::var("MATRIX_DEVICE_ID").map_err(|_| {
                    AppError::Config("MATRIX_ACCESS_TOKEN set but MATRIX_DEVICE_ID missing".into())
                })?,
                access_token: token,
            }),
            _ => None,
        };

        let write_retries = env::var("STORE_WRITE_RETRIES")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(3);

        let write_timeout = env::var("STORE_WRITE_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(5));

        Ok(Self {
            data_root,
            listen_addr,
            cookie_secret,
            matrix,
            write_retries,
            write_timeout,
        })
    }
}
