//! Optional on-disk CLI configuration.
//!
//! `.svindex/config.toml` in the current directory supplies defaults
//! for anything not given on the command line, using the same key names
//! the editor client uses:
//!
//! ```toml
//! fileListPath = "rtl/files.fls"
//! indexFilePath = "build/index.json"
//! usePrebuiltIndex = false
//!
//! [backend]
//! veribleInstallPath = "/opt/verible/bin"
//!
//! [serve]
//! addr = "127.0.0.1:7878"
//!
//! [http]
//! server = "http://127.0.0.1:7878"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::args::SourceArgs;
use crate::models::WorkspaceConfig;

const CONFIG_PATH: &str = ".svindex/config.toml";

/// Top-level representation of `.svindex/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub serve: Option<ServeSection>,

    #[serde(default)]
    pub http: Option<HttpSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServeSection {
    #[serde(default)]
    pub addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HttpSection {
    #[serde(default)]
    pub server: Option<String>,
}

/// Load the config file from the current directory, if present.
pub fn load_cli_config() -> Result<Option<CliConfig>> {
    load_cli_config_from(Path::new(CONFIG_PATH))
}

pub fn load_cli_config_from(path: &Path) -> Result<Option<CliConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(config))
}

/// Fill unset source arguments from the config file.
pub fn apply_source_defaults(config: &CliConfig, source: &mut SourceArgs) {
    let workspace = &config.workspace;

    if source.file_list.is_none() && !workspace.file_list_path.as_os_str().is_empty() {
        source.file_list = Some(workspace.file_list_path.clone());
    }
    if source.index_file.is_none() && !workspace.index_file_path.as_os_str().is_empty() {
        source.index_file = Some(workspace.index_file_path.clone());
    }
    if source.install_path.is_none()
        && !workspace.backend.verible_install_path.as_os_str().is_empty()
    {
        source.install_path = Some(workspace.backend.verible_install_path.clone());
    }
    source.use_prebuilt_index |= workspace.use_prebuilt_index;
}

/// Resolve the daemon URL a query should use: an explicit `--server`
/// wins, then the config file, and `--no-server` disables both.
pub fn effective_server_url(
    server_flag: Option<&str>,
    no_server: bool,
    config: Option<&CliConfig>,
) -> Option<String> {
    if no_server {
        return None;
    }
    if let Some(url) = server_flag {
        return Some(url.to_string());
    }
    config
        .and_then(|c| c.http.as_ref())
        .and_then(|http| http.server.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn config_file_round_trips_editor_key_names() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                fileListPath = "rtl/files.fls"
                usePrebuiltIndex = true

                [backend]
                veribleInstallPath = "/opt/verible/bin"

                [http]
                server = "http://127.0.0.1:7878"
            "#,
        )
        .expect("write");

        let config = load_cli_config_from(&path).expect("load").expect("present");
        assert_eq!(
            config.workspace.file_list_path,
            PathBuf::from("rtl/files.fls")
        );
        assert!(config.workspace.use_prebuilt_index);
        assert_eq!(
            config.workspace.backend.verible_install_path,
            PathBuf::from("/opt/verible/bin")
        );
        assert_eq!(
            config.http.as_ref().and_then(|h| h.server.as_deref()),
            Some("http://127.0.0.1:7878")
        );
    }

    #[test]
    fn missing_config_is_not_an_error() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("absent.toml");
        assert!(load_cli_config_from(&missing).expect("load").is_none());
    }

    #[test]
    fn source_defaults_fill_only_unset_fields() {
        let config = CliConfig {
            workspace: WorkspaceConfig {
                file_list_path: PathBuf::from("rtl/files.fls"),
                index_file_path: PathBuf::from("build/index.json"),
                ..WorkspaceConfig::default()
            },
            ..CliConfig::default()
        };

        let mut source = SourceArgs {
            file_list: Some(PathBuf::from("override.fls")),
            ..SourceArgs::default()
        };
        apply_source_defaults(&config, &mut source);

        assert_eq!(source.file_list, Some(PathBuf::from("override.fls")));
        assert_eq!(source.index_file, Some(PathBuf::from("build/index.json")));
    }

    #[test]
    fn server_resolution_prefers_the_flag_and_honors_no_server() {
        let config = CliConfig {
            http: Some(HttpSection {
                server: Some("http://config:1".to_string()),
            }),
            ..CliConfig::default()
        };

        assert_eq!(
            effective_server_url(Some("http://flag:2"), false, Some(&config)).as_deref(),
            Some("http://flag:2")
        );
        assert_eq!(
            effective_server_url(None, false, Some(&config)).as_deref(),
            Some("http://config:1")
        );
        assert_eq!(effective_server_url(Some("http://flag:2"), true, Some(&config)), None);
        assert_eq!(effective_server_url(None, false, None), None);
    }
}
