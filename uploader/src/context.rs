//! Application context.
//!
//! Built once at start-up and passed by reference to whatever needs it:
//! configuration, the shared HTTP client, the notice board and the signed-in
//! user's profile. `logout` is the explicit teardown.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::coordinator::BatchCoordinator;
use crate::error::{ConfigError, ImageUploadError};
use crate::image::ImageUploader;
use crate::notice::NoticeBoard;
use crate::session::SessionClient;
use crate::transport::HttpTransport;

/// Profile of the signed-in user, as shown in the profile menu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub img_url: Option<String>,
    pub role: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("N/A")
    }

    pub fn display_email(&self) -> &str {
        self.email.as_deref().unwrap_or("N/A")
    }

    pub fn display_role(&self) -> &str {
        self.role.as_deref().unwrap_or("N/A")
    }
}

/// Everything process-wide, owned in one place.
#[derive(Debug)]
pub struct AppContext {
    config: Config,
    http: reqwest::Client,
    notices: NoticeBoard,
    user: Option<UserProfile>,
}

impl AppContext {
    pub fn init(config: Config) -> Result<Self, ConfigError> {
        let http = config.http_client()?;
        log::debug!("Context ready for {}", config.api_url);
        Ok(Self {
            config,
            http,
            notices: NoticeBoard::new(),
            user: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn sign_in(&mut self, profile: UserProfile) {
        log::info!("Signed in as {} ({})", profile.display_name(), profile.display_role());
        self.user = Some(profile);
    }

    /// Drop the user profile. The context stays usable for a new sign-in.
    pub fn logout(&mut self) {
        if let Some(user) = self.user.take() {
            log::info!("Signed out {}", user.display_name());
        }
    }

    pub fn transport(&self) -> HttpTransport {
        HttpTransport::new(self.http.clone(), &self.config)
    }

    pub fn coordinator(&self) -> BatchCoordinator<HttpTransport> {
        BatchCoordinator::new(self.transport())
    }

    pub fn session_client(&self) -> SessionClient {
        SessionClient::new(self.http.clone(), self.config.clone())
    }

    pub fn image_uploader(&self) -> Result<ImageUploader, ImageUploadError> {
        ImageUploader::from_config(self.http.clone(), &self.config)
    }
}
