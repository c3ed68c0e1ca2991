//! Command-line wrapper: flag parsing, options-file precedence, logging
//! setup, and process lifecycle around the proxy core.

use anyhow::Context;
use clap::Parser;
use json_caching_proxy::config::Config;
use json_caching_proxy::har::HarDocument;
use json_caching_proxy::proxy::ProxyServer;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "json-caching-proxy",
    version,
    about = "Caching HTTP proxy for recording and replaying API traffic"
)]
struct Args {
    /// Options file (JSON); file values override command-line flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Remote server to proxy against (e.g. https://api.example.com:8080)
    #[arg(short, long)]
    url: Option<String>,

    /// Port for the local proxy server
    #[arg(short, long)]
    port: Option<u16>,

    /// HAR file used to hydrate the cache before serving
    #[arg(long)]
    har: Option<PathBuf>,

    /// Colon-separated cache-busting query params to ignore (e.g. _:time:dc)
    #[arg(short, long)]
    bust: Option<String>,

    /// Regex matched against "METHOD path"; matching routes are never cached
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Cache every response, not just JSON
    #[arg(short = 'a', long)]
    all: bool,

    /// Disable cache playback
    #[arg(long)]
    no_playback: bool,

    /// Disable recording to cache
    #[arg(long)]
    no_record: bool,

    /// Prefix for the admin endpoints
    #[arg(long)]
    prefix: Option<String>,

    /// Response header marking cache hits and misses
    #[arg(long)]
    header: Option<String>,
}

/// Options accepted from the JSON options file. File values take precedence
/// over command-line flags.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FileOptions {
    remote_server_url: Option<String>,
    proxy_port: Option<u16>,
    input_har_file: Option<PathBuf>,
    cache_busting_params: Option<Vec<String>>,
    excluded_route_matchers: Option<Vec<String>>,
    cache_everything: Option<bool>,
    data_playback: Option<bool>,
    data_record: Option<bool>,
    command_prefix: Option<String>,
    proxy_header_identifier: Option<String>,
    upstream_timeout_secs: Option<u64>,
}

/// Merge file options over command-line flags into a resolved `Config` and
/// the HAR hydration path, if any.
fn resolve(args: &Args, file: FileOptions) -> anyhow::Result<(Config, Option<PathBuf>)> {
    let remote_url = file
        .remote_server_url
        .or_else(|| args.url.clone())
        .context("a remote server URL is required (--url or remoteServerUrl)")?;

    let mut config = Config::new(remote_url);

    if let Some(port) = file.proxy_port.or(args.port) {
        config.proxy_port = port;
    }

    let bust_from_args = args.bust.as_ref().map(|list| {
        list.split(':')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    });
    if let Some(params) = file.cache_busting_params.or(bust_from_args) {
        config.cache_busting_params = params;
    }

    config.excluded_route_matchers = file
        .excluded_route_matchers
        .unwrap_or_else(|| args.exclude.clone());
    config.cache_everything = file.cache_everything.unwrap_or(args.all);
    config.data_playback = file.data_playback.unwrap_or(!args.no_playback);
    config.data_record = file.data_record.unwrap_or(!args.no_record);

    if let Some(prefix) = file.command_prefix.or_else(|| args.prefix.clone()) {
        config.command_prefix = prefix;
    }
    if let Some(header) = file.proxy_header_identifier.or_else(|| args.header.clone()) {
        config.proxy_header_identifier = header;
    }
    if let Some(secs) = file.upstream_timeout_secs {
        config.upstream_timeout_secs = secs;
    }

    let har_path = file.input_har_file.or_else(|| args.har.clone());
    Ok((config, har_path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let file_options = match &args.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("could not read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("could not parse config file {}", path.display()))?
        }
        None => FileOptions::default(),
    };

    let (config, har_path) = resolve(&args, file_options)?;

    let har = match &har_path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("could not read HAR file {}", path.display()))?;
            match serde_json::from_str::<HarDocument>(&contents) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!("Ignoring HAR file {}: {e}", path.display());
                    None
                }
            }
        }
        None => None,
    };

    let server = ProxyServer::new(config, har)?;
    let handle = server.start().await?;

    tokio::signal::ctrl_c().await.ok();
    handle.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn bare_args() -> Args {
        Args::parse_from(["json-caching-proxy"])
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_resolve_requires_remote_url() {
        assert!(resolve(&bare_args(), FileOptions::default()).is_err());
    }

    #[test]
    fn test_resolve_file_overrides_flags() {
        let args = Args::parse_from([
            "json-caching-proxy",
            "--url",
            "http://flag:8000",
            "--port",
            "4000",
            "--all",
        ]);
        let file: FileOptions = serde_json::from_str(
            r#"{
                "remoteServerUrl": "http://file:9000",
                "proxyPort": 5000,
                "cacheEverything": false
            }"#,
        )
        .unwrap();

        let (config, _) = resolve(&args, file).unwrap();
        assert_eq!(config.remote_server_url, "http://file:9000");
        assert_eq!(config.proxy_port, 5000);
        assert!(!config.cache_everything);
    }

    #[test]
    fn test_resolve_bust_list_splits_on_colon() {
        let args = Args::parse_from(["json-caching-proxy", "-u", "http://x", "-b", "_: time :dc"]);
        let (config, _) = resolve(&args, FileOptions::default()).unwrap();
        assert_eq!(config.cache_busting_params, vec!["_", "time", "dc"]);
    }

    #[test]
    fn test_resolve_flag_defaults() {
        let args = Args::parse_from(["json-caching-proxy", "-u", "http://x", "--no-record"]);
        let (config, har) = resolve(&args, FileOptions::default()).unwrap();
        assert!(config.data_playback);
        assert!(!config.data_record);
        assert!(har.is_none());
    }
}
