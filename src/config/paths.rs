use directories::ProjectDirs;
use std::path::PathBuf;

const LOG_DIR_ENV: &str = "TETHER_LOG_DIR";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "tether", "tether")
        .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
}

/// Get the path to the application config file
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the user's SSH known_hosts file
pub fn ssh_known_hosts_file() -> Option<PathBuf> {
    ssh_dir().map(|dir| dir.join("known_hosts"))
}

/// Get the path to the user's SSH client config
pub fn ssh_config_file() -> Option<PathBuf> {
    ssh_dir().map(|dir| dir.join("config"))
}

/// Ensure the config directory exists with proper permissions
pub fn ensure_config_dir() -> std::io::Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine config directory",
        )
    })?;
    create_private_dir(&dir)?;
    Ok(dir)
}

/// Expand tilde in path (e.g., ~/.ssh/id_rsa -> /home/user/.ssh/id_rsa)
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs_home() {
            return home;
        }
    }
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
}

/// Get the default SSH directory
pub fn ssh_dir() -> Option<PathBuf> {
    dirs_home().map(|home| home.join(".ssh"))
}

/// Default identity files, in the order they are tried
pub fn default_identity_files() -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Some(ssh_dir) = ssh_dir() {
        files.push(ssh_dir.join("id_ed25519"));
        files.push(ssh_dir.join("id_rsa"));
        files.push(ssh_dir.join("id_ecdsa"));
    }
    files
}

/// Get the log directory path
pub fn log_dir() -> Option<PathBuf> {
    log_dir_from(std::env::var(LOG_DIR_ENV).ok())
}

fn log_dir_from(env_value: Option<String>) -> Option<PathBuf> {
    if let Some(raw) = env_value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        return Some(PathBuf::from(trimmed));
    }

    config_dir().map(|d| d.join("logs"))
}

/// Ensure the log directory exists with proper permissions
pub fn ensure_log_dir() -> std::io::Result<PathBuf> {
    if std::env::var_os(LOG_DIR_ENV).is_none() {
        ensure_config_dir()?;
    }

    let dir = log_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine log directory",
        )
    })?;
    create_private_dir(&dir)?;
    Ok(dir)
}

fn create_private_dir(dir: &std::path::Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde_with_tilde() {
        let path = expand_tilde("~/test/file.txt");
        assert!(!path.to_string_lossy().starts_with("~/"));
        assert!(path.to_string_lossy().ends_with("test/file.txt"));
    }

    #[test]
    fn test_expand_tilde_without_tilde() {
        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_tilde_relative_path() {
        let path = expand_tilde("relative/path");
        assert_eq!(path, PathBuf::from("relative/path"));
    }

    #[test]
    fn test_log_dir_override_is_trimmed() {
        assert_eq!(
            log_dir_from(Some("  /var/log/tether ".to_string())),
            Some(PathBuf::from("/var/log/tether"))
        );
    }

    #[test]
    fn test_empty_log_dir_override_disables_file_logging() {
        assert_eq!(log_dir_from(Some("   ".to_string())), None);
    }

    #[test]
    fn test_log_dir_defaults_under_config_dir() {
        if let (Some(config), Some(log)) = (config_dir(), log_dir_from(None)) {
            assert!(log.starts_with(&config));
            assert!(log.ends_with("logs"));
        }
    }

    #[test]
    fn test_config_file_ends_with_toml() {
        if let Some(path) = config_file() {
            assert!(path.to_string_lossy().ends_with("config.toml"));
        }
    }

    #[test]
    fn test_default_identity_files_order() {
        let files = default_identity_files();
        if ssh_dir().is_some() {
            assert_eq!(files.len(), 3);
            assert!(files[0].ends_with("id_ed25519"));
            assert!(files[1].ends_with("id_rsa"));
        }
    }
}
