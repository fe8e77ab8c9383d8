use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use homehub_core::{
    ApiError, ClientConfig, ErrorKind, HttpMethod, HubApi, MediaQuery, MediaType, NewPlaylist,
    NewUser, Role, ScanRequest, Theme, UserSettings, UserUpdate,
};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "hubctl",
    version,
    about = "Command-line client for the home hub dashboard API",
    after_help = r#"EXAMPLES
  $ hubctl weather --city Gdansk
  $ hubctl users create --username ana --email a@b.com --password s3cret --role admin
  $ hubctl media scan /srv/media --wait
  $ hubctl files upload ./invoice.pdf --parent HomeHubShared/docs
  $ hubctl request api/users/7 --method DELETE"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, env = "HOMEHUB_URL", help = "Hub server root, e.g. http://homehub.local:5000")]
    url: Option<String>,

    #[arg(long, env = "HOMEHUB_SESSION", help = "Cookie header value carrying the session")]
    session: Option<String>,

    #[arg(short, long, help = "Log requests and responses to stderr")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a raw request to any endpoint
    Request {
        #[arg(help = "Server-relative endpoint without a leading slash")]
        endpoint: String,
        #[arg(long, short = 'X', default_value = "GET", value_parser = parse_method)]
        method: HttpMethod,
        #[arg(long, short = 'd', help = "JSON body (POST and PUT only)", value_parser = parse_json)]
        data: Option<Value>,
    },
    /// Current weather
    Weather {
        #[arg(long, help = "City name (default: the saved default city)")]
        city: Option<String>,
    },
    /// Search cities by name prefix
    Cities { query: String },
    /// Network status, link quality or discovered devices
    Network {
        #[arg(value_enum, default_value = "status")]
        view: NetworkView,
    },
    #[command(subcommand)]
    Users(UsersCommand),
    /// Change the session user's password
    Password {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    #[command(subcommand)]
    Settings(SettingsCommand),
    #[command(subcommand)]
    Files(FilesCommand),
    #[command(subcommand)]
    Media(MediaCommand),
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum NetworkView {
    Status,
    Quality,
    Devices,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RoleArg {
    Admin,
    User,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => Role::Admin,
            RoleArg::User => Role::User,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ThemeArg {
    Light,
    Dark,
}

impl From<ThemeArg> for Theme {
    fn from(theme: ThemeArg) -> Self {
        match theme {
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MediaKind {
    All,
    Video,
    Audio,
    Image,
}

impl From<MediaKind> for MediaType {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::All => MediaType::All,
            MediaKind::Video => MediaType::Video,
            MediaKind::Audio => MediaType::Audio,
            MediaKind::Image => MediaType::Image,
        }
    }
}

/// Admin user management
#[derive(Subcommand, Debug)]
enum UsersCommand {
    List,
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_enum, default_value = "user")]
        role: RoleArg,
    },
    Update {
        id: u64,
        #[command(flatten)]
        fields: UserFields,
    },
    Delete { id: u64 },
}

#[derive(Args, Debug)]
struct UserFields {
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long, value_enum)]
    role: Option<RoleArg>,
    #[arg(long)]
    password: Option<String>,
}

/// Dashboard preferences
#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        city: Option<String>,
        #[arg(long, value_enum)]
        theme: Option<ThemeArg>,
    },
}

/// Shared file browser
#[derive(Subcommand, Debug)]
enum FilesCommand {
    List { path: Option<String> },
    Preview { path: String },
    Delete { path: String },
    Mkdir {
        name: String,
        #[arg(long, help = "Parent folder (default: share root)")]
        parent: Option<String>,
    },
    Share { path: String },
    /// Upload a local file
    Upload {
        file: PathBuf,
        #[arg(long, help = "Target folder (default: share root)")]
        parent: Option<String>,
        #[arg(long, help = "Stored name (default: the local file name)")]
        name: Option<String>,
    },
    /// Download a file from the share
    Download {
        path: String,
        #[arg(long, short, help = "Local destination (default: the remote file name)")]
        output: Option<PathBuf>,
    },
}

/// Media center
#[derive(Subcommand, Debug)]
enum MediaCommand {
    List {
        #[arg(long = "type", value_enum, default_value = "all")]
        kind: MediaKind,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        per_page: u32,
    },
    Search { query: String },
    Scan {
        directory: String,
        #[arg(long)]
        no_recursive: bool,
        #[arg(long)]
        no_thumbnails: bool,
        #[arg(long, help = "Poll until the scan finishes")]
        wait: bool,
        #[arg(long, default_value_t = 1000, help = "Poll interval in milliseconds")]
        interval_ms: u64,
    },
    Status { task_id: String },
    Playlists,
    Playlist { id: u64 },
    NewPlaylist {
        name: String,
        #[arg(required = true, help = "Media ids in play order")]
        media_ids: Vec<u64>,
    },
    /// Stream and thumbnail URLs for a media item
    Urls { id: u64 },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CliError {
    fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| CliError::Io { path, source }
    }
}

fn parse_method(s: &str) -> Result<HttpMethod, String> {
    s.parse()
}

fn parse_json(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {e}"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn,hubctl=info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn to_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Client => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Transport => 4,
        ErrorKind::ServerError | ErrorKind::Application | ErrorKind::Http => 1,
    }
}

/// Local file errors get their own code, after the API kinds.
const IO_EXIT_CODE: u8 = 5;

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Api(err) => to_exit_code(err.kind()),
            CliError::Io { .. } => IO_EXIT_CODE,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ClientConfig::from_env();
    if let Some(url) = cli.url {
        config.base_url = url;
    }
    if let Some(session) = cli.session {
        config.session_cookie = Some(session);
    }
    let api = HubApi::new(&config);

    match run(&api, cli.command) {
        Ok(value) => {
            match serde_json::to_string_pretty(&value) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{value}"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(api: &HubApi, command: Command) -> Result<Value, CliError> {
    let value = match command {
        Command::Request {
            endpoint,
            method,
            data,
        } => api.request(&endpoint, method, data.as_ref()),
        Command::Weather { city } => api.weather(city.as_deref()),
        Command::Cities { query } => api.search_cities(&query),
        Command::Network { view } => match view {
            NetworkView::Status => api.network_status(),
            NetworkView::Quality => api.network_quality(),
            NetworkView::Devices => api.devices(),
        },
        Command::Users(cmd) => run_users(api, cmd),
        Command::Password { current, new } => api.change_password(&current, &new),
        Command::Settings(SettingsCommand::Show) => api.user_settings(),
        Command::Settings(SettingsCommand::Set { city, theme }) => {
            let settings = UserSettings {
                default_city: city,
                theme: theme.map(Theme::from),
            };
            api.update_user_settings(&settings)
        }
        Command::Files(cmd) => return run_files(api, cmd),
        Command::Media(cmd) => run_media(api, cmd),
    };
    Ok(value?)
}

fn run_users(api: &HubApi, command: UsersCommand) -> Result<Value, ApiError> {
    match command {
        UsersCommand::List => api.list_users(),
        UsersCommand::Create {
            username,
            email,
            password,
            role,
        } => api.create_user(&NewUser {
            username,
            email,
            password,
            role: role.into(),
        }),
        UsersCommand::Update { id, fields } => {
            let update = UserUpdate {
                username: fields.username,
                email: fields.email,
                role: fields.role.map(Role::from),
                password: fields.password,
            };
            api.update_user(id, &update)
        }
        UsersCommand::Delete { id } => api.delete_user(id),
    }
}

fn run_files(api: &HubApi, command: FilesCommand) -> Result<Value, CliError> {
    let value = match command {
        FilesCommand::List { path } => api.list_files(path.as_deref()),
        FilesCommand::Preview { path } => api.preview_file(&path),
        FilesCommand::Delete { path } => api.delete_file(&path),
        FilesCommand::Mkdir { name, parent } => api.create_folder(parent.as_deref(), &name),
        FilesCommand::Share { path } => api.share_link(&path),
        FilesCommand::Upload { file, parent, name } => {
            let data = std::fs::read(&file).map_err(CliError::io(&file))?;
            let name = name.unwrap_or_else(|| local_name(&file));
            api.upload_file(parent.as_deref(), &name, &data)
        }
        FilesCommand::Download { path, output } => {
            let data = api.download_file(&path)?;
            let output = output.unwrap_or_else(|| PathBuf::from(remote_name(&path)));
            std::fs::write(&output, &data).map_err(CliError::io(&output))?;
            info!(path = %output.display(), bytes = data.len(), "saved download");
            Ok(json!({ "saved": output.display().to_string(), "bytes": data.len() }))
        }
    };
    Ok(value?)
}

fn local_name(file: &std::path::Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

fn remote_name(path: &str) -> &str {
    path.rsplit('/').find(|part| !part.is_empty()).unwrap_or("download")
}

fn run_media(api: &HubApi, command: MediaCommand) -> Result<Value, ApiError> {
    match command {
        MediaCommand::List {
            kind,
            page,
            per_page,
        } => api.list_media(&MediaQuery {
            media_type: kind.into(),
            page,
            per_page,
        }),
        MediaCommand::Search { query } => api.search_media(&query),
        MediaCommand::Scan {
            directory,
            no_recursive,
            no_thumbnails,
            wait,
            interval_ms,
        } => {
            let scan = ScanRequest {
                directory,
                recursive: !no_recursive,
                generate_thumbnails: !no_thumbnails,
            };
            let task = api.start_media_scan(&scan)?;
            if !wait {
                return to_value(&task);
            }
            let status = api.wait_for_media_scan(
                &task.task_id,
                Duration::from_millis(interval_ms),
                |s| info!(status = %s.status, progress = s.progress, "scan progress"),
            )?;
            to_value(&status)
        }
        MediaCommand::Status { task_id } => to_value(&api.media_scan_status(&task_id)?),
        MediaCommand::Playlists => api.playlists(),
        MediaCommand::Playlist { id } => api.playlist_items(id),
        MediaCommand::NewPlaylist { name, media_ids } => {
            api.create_playlist(&NewPlaylist::from_media_ids(name, &media_ids))
        }
        MediaCommand::Urls { id } => Ok(json!({
            "stream": api.media_stream_url(id),
            "thumbnail": api.thumbnail_url(id),
        })),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Serialization(e.to_string()))
}
