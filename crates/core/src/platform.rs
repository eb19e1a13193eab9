//! Platform detection and executable lookup for installer selection

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Operating systems we know how to install dependencies on.
///
/// Serialized with the names package-manager tables are keyed by
/// (`darwin`, `linux`, `windows`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Darwin,
    Linux,
    Windows,
    /// Anything else. Never has installers.
    Unsupported,
}

impl Platform {
    /// Detect the current platform
    pub fn current() -> Self {
        Self::from_os(env::consts::OS)
    }

    /// Map a Rust `target_os` name onto a platform
    pub fn from_os(os: &str) -> Self {
        match os {
            "macos" | "darwin" => Platform::Darwin,
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            _ => Platform::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Darwin => "darwin",
            Platform::Linux => "linux",
            Platform::Windows => "windows",
            Platform::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Find an executable the way a shell would, searching `PATH`.
///
/// Names containing a path separator are checked as given.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    find_executable_in(name, env::var_os("PATH"))
}

pub fn find_executable_in(name: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return executable_variants(candidate).into_iter().find(|p| is_executable(p));
    }

    let path_var = path_var?;
    env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| executable_variants(&dir.join(name)))
        .find(|p| is_executable(p))
}

#[cfg(windows)]
fn executable_variants(path: &Path) -> Vec<PathBuf> {
    if path.extension().is_some() {
        return vec![path.to_path_buf()];
    }
    let exts = env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    exts.split(';')
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            let mut with_ext = path.as_os_str().to_os_string();
            with_ext.push(ext);
            PathBuf::from(with_ext)
        })
        .collect()
}

#[cfg(not(windows))]
fn executable_variants(path: &Path) -> Vec<PathBuf> {
    vec![path.to_path_buf()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let platform = Platform::current();
        if cfg!(target_os = "linux") {
            assert_eq!(platform, Platform::Linux);
        } else if cfg!(target_os = "macos") {
            assert_eq!(platform, Platform::Darwin);
        } else if cfg!(target_os = "windows") {
            assert_eq!(platform, Platform::Windows);
        }
    }

    #[test]
    fn test_macos_maps_to_darwin() {
        assert_eq!(Platform::from_os("macos"), Platform::Darwin);
        assert_eq!(Platform::Darwin.to_string(), "darwin");
    }

    #[test]
    fn test_unknown_os_is_unsupported() {
        assert_eq!(Platform::from_os("freebsd"), Platform::Unsupported);
    }

    #[test]
    fn test_serde_names() {
        let yaml = serde_yaml::to_string(&Platform::Windows).unwrap();
        assert_eq!(yaml.trim(), "windows");
        let parsed: Platform = serde_yaml::from_str("linux").unwrap();
        assert_eq!(parsed, Platform::Linux);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_in_path() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let tool = temp_dir.path().join("fake-nmap");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        let plain = temp_dir.path().join("not-executable");
        std::fs::write(&plain, "").unwrap();

        let path_var = env::join_paths([temp_dir.path()]).unwrap();
        assert_eq!(
            find_executable_in("fake-nmap", Some(path_var.clone())),
            Some(tool.clone())
        );
        assert_eq!(find_executable_in("not-executable", Some(path_var.clone())), None);
        assert_eq!(find_executable_in("missing", Some(path_var)), None);
        assert_eq!(find_executable_in(tool.to_str().unwrap(), None), Some(tool));
    }

    #[test]
    fn test_find_executable_without_path() {
        assert_eq!(find_executable_in("sh", None), None);
        assert_eq!(find_executable_in("", Some(OsString::from("/bin"))), None);
    }
}
