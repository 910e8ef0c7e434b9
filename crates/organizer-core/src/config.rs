use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000; // timing resolution of the reminder loop
pub const DEFAULT_NOTIFY_COMMAND: &str = "notify-send";
pub const DEFAULT_REMINDER_TITLE: &str = "Reminder";

/// Top-level config (organizer.toml + ORGANIZER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Reminder loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sleep between two scans of the pending set. Reminders fire at most
    /// this late.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// When true each due job runs on the blocking pool so a slow callback
    /// does not hold up the rest of the batch. When false callbacks run on
    /// the loop; blocking notifiers (`kind = "command"`) then need the
    /// multi-thread runtime.
    #[serde(default = "bool_true")]
    pub detached_fire: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            detached_fire: true,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        // A zero interval would turn the loop into a busy spin.
        std::time::Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NotifierKind {
    /// Emit reminders as tracing events.
    #[default]
    Log,
    /// Run an external desktop notification program.
    Command,
    /// Print reminders in the interactive session.
    Stdout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,
    /// Program invoked as `<command> <title> <message>` for `kind = "command"`.
    #[serde(default = "default_notify_command")]
    pub command: String,
    /// Title attached to every task reminder.
    #[serde(default = "default_reminder_title")]
    pub title: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            command: default_notify_command(),
            title: default_reminder_title(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_notify_command() -> String {
    DEFAULT_NOTIFY_COMMAND.to_string()
}
fn default_reminder_title() -> String {
    DEFAULT_REMINDER_TITLE.to_string()
}
fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}
fn default_db_path() -> String {
    format!("{}/.organizer/organizer.db", home_dir())
}

/// Replace a leading `~` (alone or followed by `/`) with `home`.
pub fn expand_home(path: &str, home: &str) -> String {
    if path == "~" {
        home.to_string()
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("{}/{}", home.trim_end_matches('/'), rest)
    } else {
        path.to_string()
    }
}

impl OrganizerConfig {
    /// Load config from a TOML file with ORGANIZER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.organizer/organizer.toml
    ///
    /// Env keys split on `__` so `ORGANIZER_SCHEDULER__POLL_INTERVAL_MS=250`
    /// maps to `scheduler.poll_interval_ms`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let home = home_dir();
        let path = config_path
            .map(|p| expand_home(p, &home))
            .unwrap_or_else(default_config_path);

        let config: Self = Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::OrganizerError::Config(e.to_string()))?;
        Ok(config.with_home(&home))
    }

    /// Expand `~` in file paths against `home`.
    pub fn with_home(mut self, home: &str) -> Self {
        self.database.path = expand_home(&self.database.path, home);
        self
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ORGANIZER_").split("__"))
    }
}

fn default_config_path() -> String {
    format!("{}/.organizer/organizer.toml", home_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg: OrganizerConfig = Figment::new()
            .merge(Toml::file("/nonexistent/organizer.toml"))
            .extract()
            .expect("defaults should extract");
        assert_eq!(cfg.scheduler.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert!(cfg.scheduler.detached_fire);
        assert_eq!(cfg.notifier.kind, NotifierKind::Log);
        assert_eq!(cfg.notifier.title, DEFAULT_REMINDER_TITLE);
    }

    #[test]
    fn toml_overrides_sections() {
        let toml = r#"
            [scheduler]
            poll_interval_ms = 250
            detached_fire = false

            [notifier]
            kind = "command"
            command = "dunstify"
        "#;
        let cfg: OrganizerConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .expect("valid toml");
        assert_eq!(cfg.scheduler.poll_interval_ms, 250);
        assert!(!cfg.scheduler.detached_fire);
        assert_eq!(cfg.notifier.kind, NotifierKind::Command);
        assert_eq!(cfg.notifier.command, "dunstify");
        assert_eq!(cfg.notifier.title, DEFAULT_REMINDER_TITLE);
    }

    #[test]
    fn tilde_db_path_resolves_under_home() {
        let toml = r#"
            [database]
            path = "~/.organizer/organizer.db"
        "#;
        let cfg: OrganizerConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .expect("valid toml");
        let cfg = cfg.with_home("/home/ada");
        assert_eq!(cfg.database.path, "/home/ada/.organizer/organizer.db");
    }

    #[test]
    fn expand_home_leaves_other_paths_alone() {
        assert_eq!(expand_home("~", "/home/ada"), "/home/ada");
        assert_eq!(expand_home("~/x.db", "/home/ada/"), "/home/ada/x.db");
        assert_eq!(expand_home("/var/lib/x.db", "/home/ada"), "/var/lib/x.db");
        assert_eq!(expand_home("data/~/x.db", "/home/ada"), "data/~/x.db");
        assert_eq!(expand_home("~other/x.db", "/home/ada"), "~other/x.db");
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let cfg = SchedulerConfig {
            poll_interval_ms: 0,
            detached_fire: true,
        };
        assert_eq!(cfg.poll_interval(), std::time::Duration::from_millis(1));
    }
}
