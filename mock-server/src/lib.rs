use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

/// Id of the account the mock session belongs to.
pub const SESSION_USER_ID: u64 = 1;
pub const SHARE_ROOT: &str = "HomeHubShared";
/// City for which the upstream weather provider "fails".
pub const UNKNOWN_CITY: &str = "Atlantis";

/// Request body cap; uploads in the tests go past axum's 2 MB default.
pub const UPLOAD_LIMIT: usize = 64 * 1024 * 1024;

const SEED_PASSWORD: &str = "admin";
const CITIES: &[&str] = &["Warsaw", "Wroclaw", "Krakow", "Gdansk", "Poznan", "Lodz", "Warwick"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub role: String,
}

#[derive(Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub default_city: String,
    pub theme: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MediaItem {
    pub id: u64,
    pub title: String,
    pub media_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub media_id: u64,
    pub position: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct Playlist {
    pub id: u64,
    pub name: String,
    #[serde(skip)]
    pub items: Vec<PlaylistEntry>,
}

#[derive(Deserialize)]
pub struct NewPlaylist {
    pub name: String,
    pub items: Vec<PlaylistEntry>,
}

#[derive(Deserialize)]
pub struct ScanRequest {
    pub directory: String,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub generate_thumbnails: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScanProgress {
    pub status: String,
    pub progress: u32,
    pub found_files: u64,
}

#[derive(Clone, Debug)]
enum FileNode {
    Dir,
    File { mime: &'static str, content: Vec<u8> },
}

/// Everything the mock hub knows.
pub struct Hub {
    users: BTreeMap<u64, User>,
    next_user_id: u64,
    password: String,
    settings: Settings,
    files: BTreeMap<String, FileNode>,
    media: Vec<MediaItem>,
    playlists: Vec<Playlist>,
    next_playlist_id: u64,
    scans: HashMap<String, ScanProgress>,
}

impl Default for Hub {
    fn default() -> Self {
        let admin = User {
            id: SESSION_USER_ID,
            username: "admin".to_string(),
            email: "admin@homehub.local".to_string(),
            role: "admin".to_string(),
        };
        let files = [
            (SHARE_ROOT.to_string(), FileNode::Dir),
            (format!("{SHARE_ROOT}/docs"), FileNode::Dir),
            (
                format!("{SHARE_ROOT}/notes.txt"),
                FileNode::File {
                    mime: "text/plain",
                    content: b"buy milk\ncall plumber\n".to_vec(),
                },
            ),
            (
                format!("{SHARE_ROOT}/photo.png"),
                FileNode::File {
                    mime: "image/png",
                    content: vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0xff, 0x00],
                },
            ),
        ]
        .into_iter()
        .collect();
        let media = [
            ("Blue Planet", "video"),
            ("Kind of Blue", "audio"),
            ("Lake at dawn", "image"),
            ("So What", "audio"),
        ]
        .into_iter()
        .zip(1..)
        .map(|((title, media_type), id)| MediaItem {
            id,
            title: title.to_string(),
            media_type: media_type.to_string(),
        })
        .collect();

        Self {
            users: BTreeMap::from([(admin.id, admin)]),
            next_user_id: SESSION_USER_ID + 1,
            password: SEED_PASSWORD.to_string(),
            settings: Settings {
                default_city: "Warsaw".to_string(),
                theme: "light".to_string(),
            },
            files,
            media,
            playlists: Vec::new(),
            next_playlist_id: 1,
            scans: HashMap::new(),
        }
    }
}

pub type Db = Arc<RwLock<Hub>>;

/// JSON `{"error": ...}` failure, the shape every hub route uses.
pub struct Failure(StatusCode, String);

impl Failure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self(status, message.into())
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

type Reply<T = Json<Value>> = Result<T, Failure>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Hub::default()));
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{id}", put(update_user).delete(delete_user))
        .route("/api/change-password", post(change_password))
        .route("/api/user/settings", get(get_settings).post(update_settings))
        .route("/api/weather", get(weather))
        .route("/api/cities/search", get(search_cities))
        .route("/network/api/network", get(network_status))
        .route("/network/api/network/quality", get(network_quality))
        .route("/network/api/devices", get(devices))
        .route("/api/files/list", get(list_files))
        .route("/api/files/preview", get(preview_file))
        .route("/api/files/upload", post(upload_file))
        .route("/api/files/download", get(download_file))
        .route("/api/files/delete", post(delete_file))
        .route("/api/files/create-folder", post(create_folder))
        .route("/api/files/generate-share-link", post(share_link))
        .route("/api/media/list", get(list_media))
        .route("/api/media/search", get(search_media))
        .route("/api/media/scan", post(start_scan))
        .route("/api/media/scan/status/{task_id}", get(scan_status))
        .route("/api/media/playlists", get(list_playlists).post(create_playlist))
        .route("/api/media/playlists/{id}/items", get(playlist_items))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock hub listening");
    }
    axum::serve(listener, app()).await
}

// --- users ---

/// Without `X-Requested-With` the request is a page load and gets HTML.
async fn list_users(State(db): State<Db>, headers: HeaderMap) -> Response {
    if !headers.contains_key("x-requested-with") {
        return Html("<html><body><h1>Admin panel</h1></body></html>").into_response();
    }
    let hub = db.read().await;
    Json(hub.users.values().cloned().collect::<Vec<_>>()).into_response()
}

fn check_role(role: &str) -> Result<(), Failure> {
    match role {
        "admin" | "user" => Ok(()),
        _ => Err(Failure::new(StatusCode::BAD_REQUEST, "Invalid role")),
    }
}

async fn create_user(
    State(db): State<Db>,
    Json(input): Json<NewUser>,
) -> Reply<(StatusCode, Json<Value>)> {
    if input.username.is_empty() || input.email.is_empty() || input.password.is_empty() {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Incomplete data"));
    }
    let role = input.role.unwrap_or_else(|| "user".to_string());
    check_role(&role)?;

    let mut hub = db.write().await;
    if hub.users.values().any(|u| u.username == input.username) {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "User already exists"));
    }
    let id = hub.next_user_id;
    hub.next_user_id += 1;
    hub.users.insert(
        id,
        User {
            id,
            username: input.username,
            email: input.email,
            role,
        },
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created", "id": id })),
    ))
}

async fn update_user(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<UserUpdate>,
) -> Reply {
    let mut hub = db.write().await;
    let user = hub
        .users
        .get_mut(&id)
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "User does not exist"))?;

    let password_given = input.password.as_deref().is_some_and(|p| !p.is_empty());
    if input.username.is_none() && input.email.is_none() && input.role.is_none() && !password_given {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "No data to update"));
    }
    if let Some(role) = &input.role {
        check_role(role)?;
    }
    if let Some(username) = input.username {
        user.username = username;
    }
    if let Some(email) = input.email {
        user.email = email;
    }
    if let Some(role) = input.role {
        user.role = role;
    }
    Ok(Json(json!({ "success": true, "message": "User updated" })))
}

async fn delete_user(State(db): State<Db>, Path(id): Path<u64>) -> Reply {
    if id == SESSION_USER_ID {
        return Err(Failure::new(
            StatusCode::BAD_REQUEST,
            "You cannot delete your own account",
        ));
    }
    let mut hub = db.write().await;
    hub.users
        .remove(&id)
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "User does not exist"))?;
    Ok(Json(json!({ "success": true, "message": "User deleted" })))
}

async fn change_password(State(db): State<Db>, Json(input): Json<PasswordChange>) -> Reply {
    if input.new_password.is_empty() {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Incomplete data"));
    }
    let mut hub = db.write().await;
    if hub.password != input.current_password {
        return Err(Failure::new(
            StatusCode::BAD_REQUEST,
            "Current password is incorrect",
        ));
    }
    hub.password = input.new_password;
    Ok(Json(json!({ "success": true, "message": "Password changed" })))
}

// --- settings & weather ---

async fn get_settings(State(db): State<Db>) -> Json<Settings> {
    Json(db.read().await.settings.clone())
}

async fn update_settings(State(db): State<Db>, Json(input): Json<Value>) -> Reply {
    let fields = input.as_object().filter(|o| !o.is_empty()).ok_or_else(|| {
        Failure::new(StatusCode::BAD_REQUEST, "No data to update")
    })?;
    let mut hub = db.write().await;
    if let Some(city) = fields.get("default_city").and_then(Value::as_str) {
        hub.settings.default_city = city.to_string();
    }
    if let Some(theme) = fields.get("theme").and_then(Value::as_str) {
        hub.settings.theme = theme.to_string();
    }
    Ok(Json(json!({ "success": true, "message": "Settings updated" })))
}

#[derive(Deserialize)]
pub struct CityQuery {
    pub city: Option<String>,
}

async fn weather(State(db): State<Db>, Query(query): Query<CityQuery>) -> Reply {
    let city = match query.city.filter(|c| !c.is_empty()) {
        Some(city) => city,
        None => db.read().await.settings.default_city.clone(),
    };
    if city == UNKNOWN_CITY {
        return Err(Failure::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Could not fetch weather data",
        ));
    }
    let seed = city.bytes().map(u32::from).sum::<u32>();
    Ok(Json(json!({
        "city": city,
        "temperature": f64::from(seed % 30) + 0.5,
        "condition": "scattered clouds",
        "humidity": 40 + seed % 50,
        "wind_speed": 12.6,
        "pressure": 1013,
        "icon": "03d",
    })))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

async fn search_cities(Query(query): Query<SearchQuery>) -> Reply {
    if query.q.chars().count() < 3 {
        return Err(Failure::new(
            StatusCode::BAD_REQUEST,
            "Enter at least 3 characters",
        ));
    }
    let needle = query.q.to_lowercase();
    let found: Vec<Value> = CITIES
        .iter()
        .filter(|c| c.to_lowercase().starts_with(&needle))
        .map(|c| {
            let country = if *c == "Warwick" { "GB" } else { "PL" };
            json!({ "name": c, "country": country })
        })
        .collect();
    Ok(Json(Value::Array(found)))
}

// --- network ---

async fn network_status() -> Json<Value> {
    Json(json!({
        "status": "online",
        "local_ip": "192.168.1.10",
        "public_ip": "203.0.113.7",
        "gateway": "192.168.1.1",
        "download_speed": 94.2,
        "upload_speed": 38.5,
        "connected_devices": 3,
    }))
}

async fn network_quality() -> Json<Value> {
    Json(json!({ "ping": 14, "jitter": 2, "packet_loss": 0 }))
}

async fn devices() -> Json<Value> {
    Json(json!([
        { "ip": "192.168.1.1", "mac": "aa:bb:cc:00:00:01", "hostname": "router", "category": "router" },
        { "ip": "192.168.1.20", "mac": "aa:bb:cc:00:00:14", "hostname": "living-room-tv", "category": "tv" },
        { "ip": "192.168.1.31", "mac": "aa:bb:cc:00:00:1f", "hostname": "phone", "category": "mobile" },
    ]))
}

// --- files ---

#[derive(Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

#[derive(Deserialize)]
pub struct PathBody {
    #[serde(default)]
    pub path: String,
}

#[derive(Deserialize)]
pub struct FolderBody {
    #[serde(default)]
    pub name: String,
}

fn resolve(path: Option<String>) -> Result<String, Failure> {
    let path = path
        .map(|p| p.trim_matches('/').to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| SHARE_ROOT.to_string());
    let inside = path == SHARE_ROOT || path.starts_with(&format!("{SHARE_ROOT}/"));
    if !inside || path.split('/').any(|part| part == "..") {
        return Err(Failure::new(StatusCode::FORBIDDEN, "Invalid path"));
    }
    Ok(path)
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

async fn list_files(State(db): State<Db>, Query(query): Query<PathQuery>) -> Reply {
    let dir = resolve(query.path)?;
    let hub = db.read().await;
    if !matches!(hub.files.get(&dir), Some(FileNode::Dir)) {
        return Err(Failure::new(StatusCode::NOT_FOUND, "Directory does not exist"));
    }
    let mut entries: Vec<(bool, String, Value)> = hub
        .files
        .iter()
        .filter(|(path, _)| parent_of(path) == dir)
        .map(|(path, node)| {
            let name = path.rsplit('/').next().unwrap_or(path.as_str()).to_string();
            let (is_dir, size) = match node {
                FileNode::Dir => (true, 0),
                FileNode::File { content, .. } => (false, content.len()),
            };
            let entry = json!({ "name": name, "path": path, "is_dir": is_dir, "size": size });
            (!is_dir, name, entry)
        })
        .collect();
    entries.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    Ok(Json(Value::Array(entries.into_iter().map(|e| e.2).collect())))
}

/// Text files come back as JSON; everything else as raw bytes.
async fn preview_file(State(db): State<Db>, Query(query): Query<PathQuery>) -> Result<Response, Failure> {
    if query.path.as_deref().map_or(true, str::is_empty) {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Path is required"));
    }
    let path = resolve(query.path)?;
    let hub = db.read().await;
    let Some(FileNode::File { mime, content }) = hub.files.get(&path) else {
        return Err(Failure::new(
            StatusCode::NOT_FOUND,
            "File does not exist or is a directory",
        ));
    };
    let filename = path.rsplit('/').next().unwrap_or(path.as_str());
    if mime.starts_with("text/") {
        let text = String::from_utf8_lossy(content);
        return Ok(Json(json!({ "type": "text", "content": text, "filename": filename })).into_response());
    }
    Ok(([(header::CONTENT_TYPE, *mime)], content.clone()).into_response())
}

fn mime_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt" | "md" | "log" | "csv") => "text/plain",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("pdf") => "application/pdf",
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

/// First free name in `dir`: `name`, then `stem_1.ext`, `stem_2.ext`, ...
fn free_name(files: &BTreeMap<String, FileNode>, dir: &str, name: &str) -> String {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
        _ => (name, String::new()),
    };
    let mut candidate = name.to_string();
    let mut n = 1;
    while files.contains_key(&format!("{dir}/{candidate}")) {
        candidate = format!("{stem}_{n}{ext}");
        n += 1;
    }
    candidate
}

fn bad_form(err: axum::extract::multipart::MultipartError) -> Failure {
    Failure::new(StatusCode::BAD_REQUEST, err.to_string())
}

/// Stores the `file` part of a multipart form. An unknown or invalid target
/// folder falls back to the share root.
async fn upload_file(
    State(db): State<Db>,
    Query(query): Query<PathQuery>,
    mut form: Multipart,
) -> Reply<(StatusCode, Json<Value>)> {
    let mut upload = None;
    while let Some(field) = form.next_field().await.map_err(bad_form)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(bad_form)?;
        upload = Some((filename, data));
        break;
    }
    let (filename, data) =
        upload.ok_or_else(|| Failure::new(StatusCode::BAD_REQUEST, "No file uploaded"))?;
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if name.is_empty() || name == ".." {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "No file selected"));
    }

    let mut hub = db.write().await;
    let dir = resolve(query.path)
        .ok()
        .filter(|dir| matches!(hub.files.get(dir), Some(FileNode::Dir)))
        .unwrap_or_else(|| SHARE_ROOT.to_string());
    let stored = free_name(&hub.files, &dir, &name);
    info!(dir = %dir, file = %stored, bytes = data.len(), "file uploaded");
    hub.files.insert(
        format!("{dir}/{stored}"),
        FileNode::File {
            mime: mime_for(&stored),
            content: data.to_vec(),
        },
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "File uploaded successfully", "filename": stored })),
    ))
}

async fn download_file(State(db): State<Db>, Query(query): Query<PathQuery>) -> Result<Response, Failure> {
    if query.path.as_deref().map_or(true, str::is_empty) {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Path is required"));
    }
    let path = resolve(query.path)?;
    let hub = db.read().await;
    let Some(FileNode::File { mime, content }) = hub.files.get(&path) else {
        return Err(Failure::new(StatusCode::NOT_FOUND, "File does not exist"));
    };
    let filename = path.rsplit('/').next().unwrap_or(path.as_str());
    let disposition = format!("attachment; filename=\"{filename}\"");
    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content.clone(),
    )
        .into_response())
}

async fn delete_file(State(db): State<Db>, Json(input): Json<PathBody>) -> Reply {
    if input.path.is_empty() {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Path is required"));
    }
    let path = resolve(Some(input.path))?;
    if path == SHARE_ROOT {
        return Err(Failure::new(StatusCode::FORBIDDEN, "Invalid path"));
    }
    let mut hub = db.write().await;
    if hub.files.remove(&path).is_none() {
        return Err(Failure::new(StatusCode::NOT_FOUND, "File does not exist"));
    }
    let nested = format!("{path}/");
    hub.files.retain(|p, _| !p.starts_with(&nested));
    Ok(Json(json!({ "message": "File/folder deleted successfully" })))
}

async fn create_folder(
    State(db): State<Db>,
    Query(query): Query<PathQuery>,
    Json(input): Json<FolderBody>,
) -> Reply {
    let parent = resolve(query.path).map_err(|_| Failure::new(StatusCode::FORBIDDEN, "Invalid parent path"))?;
    let name = input.name.trim();
    if name.is_empty() {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Folder name is required"));
    }
    if name.contains('/') || name == ".." {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Invalid folder name"));
    }
    let mut hub = db.write().await;
    if !matches!(hub.files.get(&parent), Some(FileNode::Dir)) {
        return Err(Failure::new(StatusCode::NOT_FOUND, "Parent folder does not exist"));
    }
    let path = format!("{parent}/{name}");
    if hub.files.contains_key(&path) {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Folder already exists"));
    }
    hub.files.insert(path.clone(), FileNode::Dir);
    Ok(Json(json!({ "success": true, "path": path })))
}

async fn share_link(State(db): State<Db>, Json(input): Json<PathBody>) -> Reply {
    if input.path.is_empty() {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Path is required"));
    }
    let path = resolve(Some(input.path))?;
    if !db.read().await.files.contains_key(&path) {
        return Err(Failure::new(StatusCode::NOT_FOUND, "File does not exist"));
    }
    Ok(Json(json!({
        "share_link": Uuid::new_v4().simple().to_string(),
        "expires_in_days": 7,
    })))
}

// --- media ---

#[derive(Deserialize)]
pub struct MediaListQuery {
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

async fn list_media(State(db): State<Db>, Query(query): Query<MediaListQuery>) -> Json<Vec<MediaItem>> {
    let media_type = query.media_type.unwrap_or_else(|| "all".to_string());
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20);
    let hub = db.read().await;
    let mut items: Vec<MediaItem> = hub
        .media
        .iter()
        .filter(|m| media_type == "all" || m.media_type == media_type)
        .cloned()
        .collect();
    items.sort_by(|a, b| a.title.cmp(&b.title));
    let offset = (page - 1).saturating_mul(per_page);
    Json(items.into_iter().skip(offset).take(per_page).collect())
}

async fn search_media(State(db): State<Db>, Query(query): Query<SearchQuery>) -> Json<Vec<MediaItem>> {
    let needle = query.q.to_lowercase();
    let hub = db.read().await;
    Json(
        hub.media
            .iter()
            .filter(|m| m.title.to_lowercase().contains(&needle))
            .cloned()
            .collect(),
    )
}

async fn start_scan(State(db): State<Db>, Json(input): Json<ScanRequest>) -> Reply {
    if input.directory.is_empty() {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Directory is required"));
    }
    let task_id = Uuid::new_v4().to_string();
    info!(
        %task_id,
        directory = %input.directory,
        recursive = input.recursive,
        thumbnails = input.generate_thumbnails,
        "media scan started"
    );
    db.write().await.scans.insert(
        task_id.clone(),
        ScanProgress {
            status: "scanning".to_string(),
            progress: 0,
            found_files: 0,
        },
    );
    Ok(Json(json!({ "task_id": task_id })))
}

/// Each poll advances a scan by half; the second poll reports completion.
async fn scan_status(State(db): State<Db>, Path(task_id): Path<String>) -> Reply<Json<ScanProgress>> {
    let mut hub = db.write().await;
    let found = hub.media.len() as u64;
    let scan = hub
        .scans
        .get_mut(&task_id)
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "Unknown scan task"))?;
    if scan.status != "complete" {
        scan.progress = (scan.progress + 50).min(100);
        if scan.progress == 100 {
            scan.status = "complete".to_string();
            scan.found_files = found;
        }
    }
    Ok(Json(scan.clone()))
}

async fn list_playlists(State(db): State<Db>) -> Json<Vec<Playlist>> {
    Json(db.read().await.playlists.clone())
}

async fn create_playlist(
    State(db): State<Db>,
    Json(input): Json<NewPlaylist>,
) -> Reply<(StatusCode, Json<Value>)> {
    if input.name.trim().is_empty() {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Playlist name is required"));
    }
    if input.items.is_empty() {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Playlist has no items"));
    }
    let mut hub = db.write().await;
    if let Some(missing) = input
        .items
        .iter()
        .find(|e| !hub.media.iter().any(|m| m.id == e.media_id))
    {
        return Err(Failure::new(
            StatusCode::BAD_REQUEST,
            format!("Unknown media id {}", missing.media_id),
        ));
    }
    let id = hub.next_playlist_id;
    hub.next_playlist_id += 1;
    hub.playlists.push(Playlist {
        id,
        name: input.name,
        items: input.items,
    });
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "id": id }))))
}

async fn playlist_items(State(db): State<Db>, Path(id): Path<u64>) -> Reply {
    let hub = db.read().await;
    let playlist = hub
        .playlists
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "Playlist not found"))?;
    let mut entries = playlist.items.clone();
    entries.sort_by_key(|e| e.position);
    let items: Vec<Value> = entries
        .iter()
        .filter_map(|e| {
            hub.media.iter().find(|m| m.id == e.media_id).map(|m| {
                json!({ "position": e.position, "media_id": m.id, "title": m.title, "media_type": m.media_type })
            })
        })
        .collect();
    Ok(Json(Value::Array(items)))
}
