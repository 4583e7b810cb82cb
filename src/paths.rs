use std::path::PathBuf;

pub fn default_data_dir() -> PathBuf {
    let base = match std::env::var_os("HOME") {
        Some(home) if cfg!(target_os = "macos") => {
            PathBuf::from(home).join("Library").join("Application Support")
        }
        Some(home) => std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(home).join(".local").join("share")),
        None => return PathBuf::from("."),
    };
    let path = base.join("mood-twin");
    let _ = std::fs::create_dir_all(&path);
    path
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

pub fn default_journal_path() -> PathBuf {
    default_data_dir().join("journal.md")
}

pub fn default_capture_dir() -> PathBuf {
    default_data_dir().join("captures")
}
