//! CLI mode for shellcache: drive a worker against on-disk stores.

mod progress;

use std::path::PathBuf;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::host::WorkerHost;
use crate::manifest::AssetManifest;
use crate::network::HttpNetwork;
use crate::request::Request;
use crate::store::{CacheStorage, DiskCacheStorage};
use crate::url::resource_url;

pub use progress::{BarProgress, format_bytes, format_duration};
use progress::{print_activation, print_fill_summary};

/// A CLI subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Install the current version and activate it.
    Start,
    /// Reconcile previously staged resources into the content store.
    Activate,
    /// Fetch URLs or resource paths through the worker.
    Fetch(Vec<String>),
    /// Cache every manifest resource that is still missing.
    Offline,
    /// Show store and manifest state.
    Status,
    /// Delete all three stores.
    Wipe,
    /// Serve the app over HTTP through the worker.
    Serve,
}

/// Parsed command-line arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    /// Command to run.
    pub command: Command,
    /// Config file overriding the default location.
    pub config: Option<PathBuf>,
    /// Asset manifest file.
    pub manifest: Option<PathBuf>,
    /// Origin override.
    pub origin: Option<String>,
    /// Store directory override.
    pub store_dir: Option<PathBuf>,
    /// Server bind address override.
    pub host: Option<String>,
    /// Server port override.
    pub port: Option<u16>,
}

impl CliArgs {
    /// Applies command-line overrides on top of file configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(manifest) = &self.manifest {
            config.manifest = Some(manifest.clone());
        }
        if let Some(origin) = &self.origin {
            config.worker.origin.clone_from(origin);
        }
        if let Some(store_dir) = &self.store_dir {
            config.paths.store_dir.clone_from(store_dir);
        }
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

fn option_value<'a>(args: &'a [String], i: &mut usize, name: &str) -> std::result::Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{name} requires a value"))
}

/// Parses arguments (without the program name).
///
/// # Errors
///
/// Returns a message describing the first invalid argument.
pub fn parse_args(args: &[String]) -> std::result::Result<CliArgs, String> {
    let mut command = None;
    let mut positional = Vec::new();
    let mut parsed = CliArgs {
        command: Command::Status,
        config: None,
        manifest: None,
        origin: None,
        store_dir: None,
        host: None,
        port: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => parsed.config = Some(option_value(args, &mut i, "--config")?.into()),
            "-m" | "--manifest" => {
                parsed.manifest = Some(option_value(args, &mut i, "--manifest")?.into());
            }
            "-o" | "--origin" => parsed.origin = Some(option_value(args, &mut i, "--origin")?.into()),
            "-s" | "--store-dir" => {
                parsed.store_dir = Some(option_value(args, &mut i, "--store-dir")?.into());
            }
            "--host" => parsed.host = Some(option_value(args, &mut i, "--host")?.into()),
            "-p" | "--port" => {
                let value = option_value(args, &mut i, "--port")?;
                parsed.port = Some(value.parse().map_err(|_| format!("invalid port: {value}"))?);
            }
            arg if arg.starts_with('-') => return Err(format!("unknown option: {arg}")),
            arg if command.is_none() => command = Some(arg.to_string()),
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = command.ok_or_else(|| "no command given".to_string())?;
    parsed.command = match command.as_str() {
        "fetch" if positional.is_empty() => return Err("fetch requires at least one URL".into()),
        "fetch" => Command::Fetch(positional),
        other if !positional.is_empty() => {
            return Err(format!("{other} takes no arguments: {}", positional.join(" ")));
        }
        "start" => Command::Start,
        "activate" => Command::Activate,
        "offline" => Command::Offline,
        "status" => Command::Status,
        "wipe" => Command::Wipe,
        "serve" => Command::Serve,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(parsed)
}

/// Resolves a fetch argument to an absolute URL; bare paths are taken
/// relative to the origin.
#[must_use]
pub fn resolve_url(origin: &str, arg: &str) -> String {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        arg.to_string()
    } else {
        resource_url(origin, arg)
    }
}

fn build_host(config: &AppConfig) -> Result<WorkerHost> {
    let path = config.manifest.as_ref().ok_or(Error::ManifestMissing)?;
    let manifest = AssetManifest::load(path)?;
    let caches = DiskCacheStorage::new(config.paths.store_dir.clone());
    WorkerHost::new(config.worker.clone(), manifest, caches, HttpNetwork::new()?)
}

async fn require_active(host: &WorkerHost) -> Result<()> {
    if host.attach().await? {
        Ok(())
    } else {
        Err(Error::InvalidState(
            "this version is not activated; run `shellcache start` first".to_string(),
        ))
    }
}

async fn start(host: &WorkerHost) -> Result<()> {
    let stats = host.install().await?;
    print_fill_summary("Install", &stats);
    if host.clients().skip_waiting_requested() {
        print_activation(&host.activate().await?);
    } else {
        println!("Installed; run `shellcache activate` to take over.");
    }
    Ok(())
}

async fn fetch(host: &WorkerHost, urls: &[String]) -> Result<()> {
    if !host.attach().await? {
        log::warn!("Worker not activated, requests pass through to the network");
    }
    let origin = &host.lifecycle().config().origin;
    for arg in urls {
        let request = Request::get(resolve_url(origin, arg));
        match host.fetch(&request).await {
            Ok((response, source)) => println!(
                "{} {:<12} {:>10}  {}",
                response.status,
                source.to_string(),
                format_bytes(response.len()),
                request.url
            ),
            Err(e) => println!("ERR {e}"),
        }
    }
    Ok(())
}

async fn offline(host: &WorkerHost) -> Result<()> {
    require_active(host).await?;
    let progress = BarProgress::new();
    let result = host.lifecycle().download_offline(&progress).await;
    progress.finish();
    print_fill_summary("Offline download", &result?);
    Ok(())
}

async fn status(host: &WorkerHost) -> Result<()> {
    let lifecycle = host.lifecycle();
    let config = lifecycle.config();
    let names = lifecycle.caches().names().await?;

    println!("Origin:     {}", config.origin);
    println!("Store dir:  {}", lifecycle.caches().root().display());
    println!(
        "Stores:     {}",
        if names.is_empty() { "(none)".to_string() } else { names.join(", ") }
    );

    let version = match lifecycle.persisted_manifest().await {
        Ok(Some(recorded)) if recorded == lifecycle.manifest().resources => "current",
        Ok(Some(_)) => "outdated (run `shellcache start`)",
        Ok(None) => "not activated",
        Err(e) => {
            log::warn!("Unreadable manifest record: {e}");
            "corrupt (run `shellcache wipe`)"
        }
    };
    println!("Version:    {version}");

    let missing = lifecycle.missing_resources().await?;
    println!(
        "Resources:  {} in manifest, {} not cached",
        lifecycle.manifest().resources.len(),
        missing.len()
    );
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(host: WorkerHost, config: &AppConfig) -> Result<()> {
    if !host.attach().await? {
        host.start().await?;
    }
    crate::server::run_server(std::sync::Arc::new(host), &config.server.host, config.server.port)
        .await
}

#[cfg(not(feature = "server"))]
async fn serve(_host: WorkerHost, _config: &AppConfig) -> Result<()> {
    Err(Error::InvalidState("server support not compiled in".to_string()))
}

/// Runs a parsed command.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or the command fails.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);
    let host = build_host(&config)?;

    match &args.command {
        Command::Start => start(&host).await,
        Command::Activate => {
            print_activation(&host.lifecycle().activate().await);
            Ok(())
        }
        Command::Fetch(urls) => fetch(&host, urls).await,
        Command::Offline => offline(&host).await,
        Command::Status => status(&host).await,
        Command::Wipe => {
            host.lifecycle().wipe().await;
            println!("Deleted all stores for {}", host.lifecycle().config().origin);
            Ok(())
        }
        Command::Serve => serve(host, &config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse_args(&args(&["start"])).unwrap().command, Command::Start);
        assert_eq!(parse_args(&args(&["wipe"])).unwrap().command, Command::Wipe);
        assert_eq!(parse_args(&args(&["serve"])).unwrap().command, Command::Serve);
    }

    #[test]
    fn parse_fetch_with_urls_and_options() {
        let parsed = parse_args(&args(&[
            "--origin",
            "https://app.test",
            "fetch",
            "index.html",
            "/",
            "-p",
            "9000",
        ]))
        .unwrap();
        assert_eq!(
            parsed.command,
            Command::Fetch(vec!["index.html".to_string(), "/".to_string()])
        );
        assert_eq!(parsed.origin.as_deref(), Some("https://app.test"));
        assert_eq!(parsed.port, Some(9000));
    }

    #[test]
    fn parse_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["fetch"])).is_err());
        assert!(parse_args(&args(&["status", "extra"])).is_err());
        assert!(parse_args(&args(&["bogus"])).is_err());
        assert!(parse_args(&args(&["start", "--frobnicate"])).is_err());
        assert!(parse_args(&args(&["start", "--port", "http"])).is_err());
        assert!(parse_args(&args(&["start", "--manifest"])).is_err());
    }

    #[test]
    fn overrides_apply_on_top_of_config() {
        let parsed = parse_args(&args(&[
            "start",
            "-m",
            "build/assets.json",
            "--store-dir",
            "/tmp/stores",
            "--host",
            "0.0.0.0",
        ]))
        .unwrap();
        let mut config = AppConfig::default();
        parsed.apply(&mut config);
        assert_eq!(config.manifest, Some(PathBuf::from("build/assets.json")));
        assert_eq!(config.paths.store_dir, PathBuf::from("/tmp/stores"));
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn resolve_url_keeps_absolute_urls() {
        assert_eq!(resolve_url("https://app.test", "index.html"), "https://app.test/index.html");
        assert_eq!(resolve_url("https://app.test", "/"), "https://app.test/");
        assert_eq!(resolve_url("https://app.test", "http://other.test/x"), "http://other.test/x");
    }

    #[test]
    fn build_host_requires_manifest() {
        let config = AppConfig::default();
        assert!(matches!(build_host(&config), Err(Error::ManifestMissing)));
    }
}
