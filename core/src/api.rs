//! The `HubApi` facade: one `request` operation plus the feature calls the
//! dashboard, admin panel, file browser, media center and network grid use.
//!
//! # Design
//! `HubApi` pairs a stateless `HubClient` with a `Transport`. It holds no
//! mutable state, so one instance is built at startup and shared by
//! reference across every caller. Each call is independent: no caching,
//! retrying or queueing happens here.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};
use url::form_urlencoded;

use crate::client::HubClient;
use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::multipart::MultipartForm;
use crate::transport::{Transport, UreqTransport};
use crate::types::{
    MediaQuery, MediaType, NewPlaylist, NewUser, PasswordChange, ScanRequest, ScanStatus, ScanTask,
    UserSettings, UserUpdate, WeatherReport,
};

#[derive(Debug, Clone)]
pub struct HubApi<T = UreqTransport> {
    client: HubClient,
    transport: T,
}

impl HubApi<UreqTransport> {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_transport(HubClient::from_config(config), UreqTransport::new())
    }

    pub fn from_env() -> Self {
        Self::new(&ClientConfig::from_env())
    }
}

impl<T: Transport> HubApi<T> {
    pub fn with_transport(client: HubClient, transport: T) -> Self {
        Self { client, transport }
    }

    pub fn client(&self) -> &HubClient {
        &self.client
    }

    /// Send one request and classify the response.
    ///
    /// `endpoint` is server-relative without a leading slash. `body` is only
    /// sent for POST and PUT.
    pub fn request(&self, endpoint: &str, method: HttpMethod, body: Option<&Value>) -> Result<Value> {
        debug!(%method, endpoint, "making API request");
        let request = self.client.build_request(endpoint, method, body)?;
        let response = self.execute(endpoint, &request)?;
        self.client.parse_response(endpoint, response)
    }

    pub fn get(&self, endpoint: &str) -> Result<Value> {
        self.request(endpoint, HttpMethod::Get, None)
    }

    /// POST `form` as `multipart/form-data`; the reply is classified like any
    /// other request.
    pub fn upload(&self, endpoint: &str, form: MultipartForm) -> Result<Value> {
        debug!(endpoint, "uploading form");
        let request = self.client.build_upload(endpoint, form);
        let response = self.execute(endpoint, &request)?;
        self.client.parse_response(endpoint, response)
    }

    /// GET `endpoint` and return the body bytes on success.
    pub fn download(&self, endpoint: &str) -> Result<Vec<u8>> {
        debug!(endpoint, "downloading");
        let request = self.client.build_request(endpoint, HttpMethod::Get, None)?;
        let response = self.execute(endpoint, &request)?;
        self.client.parse_download(endpoint, response)
    }

    fn execute(&self, endpoint: &str, request: &HttpRequest) -> Result<HttpResponse> {
        self.transport.execute(request).inspect_err(|err| {
            error!(endpoint, error = %err, "transport failure");
        })
    }

    fn send<B: Serialize + ?Sized>(&self, endpoint: &str, method: HttpMethod, body: &B) -> Result<Value> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        self.request(endpoint, method, Some(&value))
    }

    // Weather

    /// Current weather for `city`, or for the user's default city.
    pub fn weather(&self, city: Option<&str>) -> Result<Value> {
        let endpoint = match city.filter(|c| !c.is_empty()) {
            Some(city) => with_query("api/weather", &[("city", city)]),
            None => "api/weather".to_string(),
        };
        self.get(&endpoint)
    }

    pub fn weather_report(&self, city: Option<&str>) -> Result<WeatherReport> {
        decode(self.weather(city)?)
    }

    pub fn search_cities(&self, query: &str) -> Result<Value> {
        self.get(&with_query("api/cities/search", &[("q", query)]))
    }

    // Network

    pub fn network_status(&self) -> Result<Value> {
        self.get("network/api/network")
    }

    pub fn network_quality(&self) -> Result<Value> {
        self.get("network/api/network/quality")
    }

    pub fn devices(&self) -> Result<Value> {
        self.get("network/api/devices")
    }

    // Users

    pub fn list_users(&self) -> Result<Value> {
        self.get("api/users")
    }

    pub fn create_user(&self, user: &NewUser) -> Result<Value> {
        self.send("api/users", HttpMethod::Post, user)
    }

    pub fn update_user(&self, user_id: u64, update: &UserUpdate) -> Result<Value> {
        self.send(&format!("api/users/{user_id}"), HttpMethod::Put, update)
    }

    pub fn delete_user(&self, user_id: u64) -> Result<Value> {
        self.request(&format!("api/users/{user_id}"), HttpMethod::Delete, None)
    }

    pub fn change_password(&self, current_password: &str, new_password: &str) -> Result<Value> {
        let body = PasswordChange {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        self.send("api/change-password", HttpMethod::Post, &body)
    }

    pub fn user_settings(&self) -> Result<Value> {
        self.get("api/user/settings")
    }

    pub fn update_user_settings(&self, settings: &UserSettings) -> Result<Value> {
        self.send("api/user/settings", HttpMethod::Post, settings)
    }

    // Files

    /// Directory listing; `None` lists the share root.
    pub fn list_files(&self, path: Option<&str>) -> Result<Value> {
        match path.filter(|p| !p.is_empty()) {
            Some(path) => self.get(&with_query("api/files/list", &[("path", path)])),
            None => self.get("api/files/list"),
        }
    }

    /// Text previews come back as `{type, content, filename}`; binary previews
    /// (images, PDFs, media) yield the `{"success": true}` sentinel.
    pub fn preview_file(&self, path: &str) -> Result<Value> {
        self.get(&with_query("api/files/preview", &[("path", path)]))
    }

    pub fn delete_file(&self, path: &str) -> Result<Value> {
        self.send("api/files/delete", HttpMethod::Post, &serde_json::json!({ "path": path }))
    }

    pub fn create_folder(&self, parent: Option<&str>, name: &str) -> Result<Value> {
        let endpoint = match parent.filter(|p| !p.is_empty()) {
            Some(parent) => with_query("api/files/create-folder", &[("path", parent)]),
            None => "api/files/create-folder".to_string(),
        };
        self.send(&endpoint, HttpMethod::Post, &serde_json::json!({ "name": name }))
    }

    pub fn share_link(&self, path: &str) -> Result<Value> {
        self.send(
            "api/files/generate-share-link",
            HttpMethod::Post,
            &serde_json::json!({ "path": path }),
        )
    }

    /// Upload `data` as `name` into `parent` (the share root when `None`).
    /// The reply names the stored file, which the server may have renamed to
    /// avoid a clash.
    pub fn upload_file(&self, parent: Option<&str>, name: &str, data: &[u8]) -> Result<Value> {
        let endpoint = match parent.filter(|p| !p.is_empty()) {
            Some(parent) => with_query("api/files/upload", &[("path", parent)]),
            None => "api/files/upload".to_string(),
        };
        self.upload(&endpoint, MultipartForm::single_file("file", name, data))
    }

    pub fn download_file(&self, path: &str) -> Result<Vec<u8>> {
        self.download(&with_query("api/files/download", &[("path", path)]))
    }

    // Media

    pub fn list_media(&self, query: &MediaQuery) -> Result<Value> {
        let page = query.page.to_string();
        let per_page = query.per_page.to_string();
        let mut params = Vec::with_capacity(3);
        if query.media_type != MediaType::All {
            params.push(("type", query.media_type.as_str()));
        }
        params.push(("page", page.as_str()));
        params.push(("per_page", per_page.as_str()));
        self.get(&with_query("api/media/list", &params))
    }

    pub fn search_media(&self, query: &str) -> Result<Value> {
        self.get(&with_query("api/media/search", &[("q", query)]))
    }

    pub fn start_media_scan(&self, scan: &ScanRequest) -> Result<ScanTask> {
        decode(self.send("api/media/scan", HttpMethod::Post, scan)?)
    }

    pub fn media_scan_status(&self, task_id: &str) -> Result<ScanStatus> {
        decode(self.get(&format!("api/media/scan/status/{}", encode(task_id)))?)
    }

    /// Poll a scan every `interval` until it completes or reports an error.
    /// `on_progress` sees every status, including the last one.
    pub fn wait_for_media_scan(
        &self,
        task_id: &str,
        interval: Duration,
        mut on_progress: impl FnMut(&ScanStatus),
    ) -> Result<ScanStatus> {
        loop {
            let status = self.media_scan_status(task_id)?;
            on_progress(&status);
            if status.is_finished() {
                return Ok(status);
            }
            std::thread::sleep(interval);
        }
    }

    pub fn playlists(&self) -> Result<Value> {
        self.get("api/media/playlists")
    }

    pub fn playlist_items(&self, playlist_id: u64) -> Result<Value> {
        self.get(&format!("api/media/playlists/{playlist_id}/items"))
    }

    pub fn create_playlist(&self, playlist: &NewPlaylist) -> Result<Value> {
        self.send("api/media/playlists", HttpMethod::Post, playlist)
    }

    /// Absolute URL a player can stream media item `media_id` from.
    pub fn media_stream_url(&self, media_id: u64) -> String {
        self.client.url_for(&format!("api/media/stream/{media_id}"))
    }

    pub fn thumbnail_url(&self, media_id: u64) -> String {
        self.client.url_for(&format!("api/media/thumbnail/{media_id}"))
    }
}

fn decode<R: DeserializeOwned>(value: Value) -> Result<R> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Append `params` to `path` as an urlencoded query string.
pub fn with_query(path: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{path}?{query}")
}

fn encode(segment: &str) -> String {
    form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::types::Role;

    type Log = Arc<Mutex<Vec<HttpRequest>>>;

    /// A facade whose transport records requests and answers every call with
    /// `status` and the JSON `body`.
    fn recording_api(
        status: u16,
        body: &str,
    ) -> (HubApi<impl Transport>, Log) {
        let log: Log = Arc::default();
        let seen = Arc::clone(&log);
        let body = body.to_string();
        let transport = move |req: &HttpRequest| -> Result<HttpResponse> {
            seen.lock().unwrap().push(req.clone());
            Ok(HttpResponse {
                status,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: body.clone().into_bytes(),
            })
        };
        (
            HubApi::with_transport(HubClient::new("http://hub"), transport),
            log,
        )
    }

    fn last(log: &Log) -> HttpRequest {
        log.lock().unwrap().last().cloned().unwrap()
    }

    #[test]
    fn weather_encodes_city() {
        let (api, log) = recording_api(200, "{}");
        api.weather(Some("São Paulo")).unwrap();
        assert_eq!(last(&log).url, "http://hub/api/weather?city=S%C3%A3o+Paulo");

        api.weather(None).unwrap();
        assert_eq!(last(&log).url, "http://hub/api/weather");
    }

    #[test]
    fn create_user_posts_json() {
        let (api, log) = recording_api(201, r#"{"message":"User created","id":7}"#);
        let user = NewUser {
            username: "ana".to_string(),
            email: "a@b.com".to_string(),
            password: "secret".to_string(),
            role: Role::Admin,
        };
        let value = api.create_user(&user).unwrap();
        assert_eq!(value, json!({"message": "User created", "id": 7}));

        let req = last(&log);
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://hub/api/users");
        let sent: Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent["role"], "admin");
    }

    #[test]
    fn delete_user_sends_no_body() {
        let (api, log) = recording_api(200, r#"{"success":true}"#);
        api.delete_user(4).unwrap();
        let req = last(&log);
        assert_eq!(req.method, HttpMethod::Delete);
        assert_eq!(req.url, "http://hub/api/users/4");
        assert!(req.body.is_none());
    }

    #[test]
    fn media_list_omits_type_for_all() {
        let (api, log) = recording_api(200, "[]");
        api.list_media(&MediaQuery::default()).unwrap();
        assert_eq!(last(&log).url, "http://hub/api/media/list?page=1&per_page=20");

        let query = MediaQuery {
            media_type: MediaType::Audio,
            page: 2,
            per_page: 5,
        };
        api.list_media(&query).unwrap();
        assert_eq!(
            last(&log).url,
            "http://hub/api/media/list?type=audio&page=2&per_page=5"
        );
    }

    #[test]
    fn create_folder_puts_parent_in_query() {
        let (api, log) = recording_api(200, r#"{"success":true}"#);
        api.create_folder(Some("HomeHubShared/docs"), "invoices").unwrap();
        let req = last(&log);
        assert_eq!(
            req.url,
            "http://hub/api/files/create-folder?path=HomeHubShared%2Fdocs"
        );
        let sent: Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({"name": "invoices"}));
    }

    #[test]
    fn scan_status_with_wrong_shape_is_decode_error() {
        let (api, _) = recording_api(200, r#"{"progress":"lots"}"#);
        let err = api.media_scan_status("t-1").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn transport_failure_is_forwarded() {
        let transport =
            |_: &HttpRequest| -> Result<HttpResponse> { Err(ApiError::Transport("connection refused".into())) };
        let api = HubApi::with_transport(HubClient::new("http://hub"), transport);
        let err = api.search_cities("War").unwrap_err();
        assert_eq!(err, ApiError::Transport("connection refused".to_string()));
    }

    #[test]
    fn wait_for_scan_polls_until_complete() {
        let polls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&polls);
        let transport = move |_: &HttpRequest| -> Result<HttpResponse> {
            let mut n = counter.lock().unwrap();
            *n += 1;
            let body = if *n < 3 {
                format!(r#"{{"status":"scanning","progress":{}}}"#, *n * 30)
            } else {
                r#"{"status":"complete","progress":100,"found_files":12}"#.to_string()
            };
            Ok(HttpResponse {
                status: 200,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: body.into_bytes(),
            })
        };
        let api = HubApi::with_transport(HubClient::new("http://hub"), transport);

        let mut seen = Vec::new();
        let status = api
            .wait_for_media_scan("t-1", Duration::from_millis(1), |s| seen.push(s.progress))
            .unwrap();
        assert_eq!(status.found_files, 12);
        assert_eq!(seen, vec![30.0, 60.0, 100.0]);
    }

    #[test]
    fn with_query_without_params_is_unchanged() {
        assert_eq!(with_query("api/media/list", &[]), "api/media/list");
    }

    #[test]
    fn upload_file_posts_multipart_to_parent() {
        let (api, log) = recording_api(201, r#"{"message":"File uploaded successfully","filename":"a.txt"}"#);
        let value = api.upload_file(Some("HomeHubShared/docs"), "a.txt", b"abc").unwrap();
        assert_eq!(value["filename"], "a.txt");

        let req = last(&log);
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://hub/api/files/upload?path=HomeHubShared%2Fdocs");
        assert!(req
            .header("content-type")
            .is_some_and(|ct| ct.starts_with("multipart/form-data; boundary=")));
        assert_eq!(req.header("x-requested-with"), Some("XMLHttpRequest"));

        api.upload_file(None, "a.txt", b"abc").unwrap();
        assert_eq!(last(&log).url, "http://hub/api/files/upload");
    }

    #[test]
    fn download_file_returns_body_bytes() {
        let (api, log) = recording_api(200, r#"{"raw":1}"#);
        let bytes = api.download_file("HomeHubShared/data.json").unwrap();
        assert_eq!(bytes, br#"{"raw":1}"#.to_vec());
        assert_eq!(
            last(&log).url,
            "http://hub/api/files/download?path=HomeHubShared%2Fdata.json"
        );
    }

    #[test]
    fn download_error_uses_server_message() {
        let (api, _) = recording_api(403, r#"{"error":"Invalid path"}"#);
        let err = api.download_file("etc/passwd").unwrap_err();
        assert_eq!(err.to_string(), "Invalid path");
    }

    #[test]
    fn media_urls_are_absolute() {
        let (api, _) = recording_api(200, "{}");
        assert_eq!(api.media_stream_url(3), "http://hub/api/media/stream/3");
        assert_eq!(api.thumbnail_url(3), "http://hub/api/media/thumbnail/3");
    }
}
