//! Client core for the home hub REST API.
//!
//! # Overview
//! Every call the dashboard, admin panel, file browser, media center and
//! network grid make goes through one facade, `HubApi::request`, so request
//! headers, status interpretation and error messages are uniform.
//!
//! # Design
//! - `HubClient` is stateless: it builds `HttpRequest` values and classifies
//!   `HttpResponse` values without touching the network.
//! - `Transport` executes the round-trip; `UreqTransport` is the blocking
//!   production implementation and keeps the session cookie jar.
//! - Uploads and downloads use the same builder and classifier; only the
//!   body encoding (`MultipartForm`) and the success value (raw bytes) differ.
//! - `HubApi` pairs the two and adds the typed feature operations. It is
//!   built once and shared by reference.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod multipart;
pub mod transport;
pub mod types;

pub use api::HubApi;
pub use client::HubClient;
pub use config::ClientConfig;
pub use error::{ApiError, ErrorKind, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use multipart::MultipartForm;
pub use transport::{Transport, UreqTransport};
pub use types::{
    MediaQuery, MediaType, NewPlaylist, NewUser, PasswordChange, PlaylistEntry, Role, ScanRequest,
    ScanStatus, ScanTask, Theme, UserSettings, UserUpdate, WeatherReport,
};
