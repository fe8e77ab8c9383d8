//! Request payloads and the few response shapes the client inspects.
//!
//! Most responses are handed to callers as plain `serde_json::Value`; only
//! values the client itself needs (weather readings, scan task handles and
//! progress) are typed here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

/// Payload for creating a user (admin only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

/// Partial user update. Omitted fields are left unchanged on the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.role.is_none() && self.password.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

/// Dashboard preferences. Omitted fields are left unchanged on the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

/// Current conditions as reported by `api/weather`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub city: String,
    pub temperature: f64,
    pub condition: String,
    pub humidity: f64,
    /// km/h
    pub wind_speed: f64,
    pub pressure: f64,
    pub icon: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    All,
    Video,
    Audio,
    Image,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::All => "all",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Image => "image",
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(MediaType::All),
            "video" => Ok(MediaType::Video),
            "audio" => Ok(MediaType::Audio),
            "image" => Ok(MediaType::Image),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

/// Paging and filter for `api/media/list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaQuery {
    pub media_type: MediaType,
    pub page: u32,
    pub per_page: u32,
}

impl Default for MediaQuery {
    fn default() -> Self {
        Self {
            media_type: MediaType::All,
            page: 1,
            per_page: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub directory: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default = "default_true")]
    pub generate_thumbnails: bool,
}

impl ScanRequest {
    pub fn new(directory: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            recursive: true,
            generate_thumbnails: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Handle returned when a media scan starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTask {
    pub task_id: String,
}

/// Progress of a running media scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub status: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub found_files: u64,
}

impl ScanStatus {
    pub const COMPLETE: &'static str = "complete";
    pub const ERROR: &'static str = "error";

    pub fn is_finished(&self) -> bool {
        self.status == Self::COMPLETE || self.status == Self::ERROR
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub media_id: u64,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlaylist {
    pub name: String,
    pub items: Vec<PlaylistEntry>,
}

impl NewPlaylist {
    /// Build a playlist whose positions follow the order of `media_ids`,
    /// starting at 1.
    pub fn from_media_ids(name: impl Into<String>, media_ids: &[u64]) -> Self {
        let items = media_ids
            .iter()
            .zip(1..)
            .map(|(&media_id, position)| PlaylistEntry { media_id, position })
            .collect();
        Self {
            name: name.into(),
            items,
        }
    }
}
