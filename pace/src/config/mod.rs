//! Configuration system for the `pace` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/pace/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use pace_proto::identity::Identity;

use crate::tasks::ReconcileSettings;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    identity: IdentityFileConfig,
    store: StoreFileConfig,
    reconcile: ReconcileFileConfig,
}

/// `[identity]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct IdentityFileConfig {
    uid: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
}

/// `[store]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    snapshot_path: Option<PathBuf>,
}

/// `[reconcile]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReconcileFileConfig {
    backfill_batch_size: Option<usize>,
    due_window_days: Option<u32>,
    weekly_window_days: Option<u32>,
    counter_interval_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaceConfig {
    /// The signed-in user.
    pub identity: Identity,
    /// Where the document snapshot is kept between runs.
    pub snapshot_path: PathBuf,
    /// Reconciliation and view tunables.
    pub reconcile: ReconcileSettings,
}

impl Default for PaceConfig {
    fn default() -> Self {
        Self {
            identity: Identity::default(),
            snapshot_path: default_snapshot_path(),
            reconcile: ReconcileSettings::default(),
        }
    }
}

impl PaceConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path (`~/.config/pace/config.toml`) is
    /// tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let reconcile = &file.reconcile;

        Self {
            identity: Identity {
                uid: cli.uid.clone().or_else(|| file.identity.uid.clone()),
                email: cli.email.clone().or_else(|| file.identity.email.clone()),
                display_name: cli
                    .name
                    .clone()
                    .or_else(|| file.identity.display_name.clone()),
            },
            snapshot_path: cli
                .snapshot
                .clone()
                .or_else(|| file.store.snapshot_path.clone())
                .unwrap_or(defaults.snapshot_path),
            reconcile: ReconcileSettings {
                backfill_batch_size: reconcile
                    .backfill_batch_size
                    .unwrap_or(defaults.reconcile.backfill_batch_size),
                due_window_days: reconcile
                    .due_window_days
                    .unwrap_or(defaults.reconcile.due_window_days),
                weekly_window_days: reconcile
                    .weekly_window_days
                    .unwrap_or(defaults.reconcile.weekly_window_days),
                counter_interval: reconcile
                    .counter_interval_secs
                    .map_or(defaults.reconcile.counter_interval, Duration::from_secs),
            },
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Task board reconciler for PACE projects")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/pace/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the JSON document snapshot.
    #[arg(long, env = "PACE_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Your user id.
    #[arg(long, env = "PACE_UID")]
    pub uid: Option<String>,

    /// Your account email.
    #[arg(long, env = "PACE_EMAIL")]
    pub email: Option<String>,

    /// Your display name.
    #[arg(long, env = "PACE_NAME")]
    pub name: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PACE_LOG")]
    pub log_level: String,

    /// Path to log file (default: stderr).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do (default: `summary`).
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// `pace` subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show counts, weekly progress, projects and a task view.
    Summary {
        /// View: pending, due-today, due-this-week, in-progress, overdue.
        #[arg(long, default_value = "pending")]
        view: String,
    },
    /// Create a task.
    Add {
        /// Task title.
        #[arg(long)]
        title: String,
        /// Due date (`YYYY-MM-DD` in local time, or RFC 3339).
        #[arg(long)]
        due: String,
        /// Assignee email or user id (default: you).
        #[arg(long)]
        assignee: Option<String>,
        /// low, medium or high.
        #[arg(long, default_value = "low")]
        priority: String,
        /// Project id.
        #[arg(long)]
        project: Option<String>,
    },
    /// Move a task to a status.
    Status {
        /// Task id.
        task_id: String,
        /// Target status (`to-do`, `in progress`, `done`, ...).
        status: String,
    },
    /// Toggle a task in or out of done.
    Toggle {
        /// Task id.
        task_id: String,
    },
    /// Create a project you own.
    Project {
        /// Project name.
        #[arg(long)]
        name: String,
        /// Description.
        #[arg(long, default_value = "")]
        description: String,
        /// Comma-separated member emails.
        #[arg(long, default_value = "")]
        members: String,
    },
    /// Join a project by id or invitation link.
    Join {
        /// Project id or invitation URL.
        code: String,
    },
    /// Recount every visible project's counters.
    Reconcile,
}

impl Default for Command {
    fn default() -> Self {
        Self::Summary {
            view: "pending".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn default_snapshot_path() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from("pace-snapshot.json"),
        |dir| dir.join("pace").join("snapshot.json"),
    )
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("pace").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
