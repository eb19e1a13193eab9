//! Built-in task and dependency catalog
//!
//! Tasks map a short name onto an analysis script and the host tools it needs.
//! Tasks from the settings file are layered on top, replacing built-ins with the
//! same name.

use std::collections::HashMap;

use crate::configs::settings::{Config, PathsConfig};
use crate::configs::tasks::TaskConfig;
use crate::execution::dependencies::{base_installers, Dependency, Installer};
use crate::platform::Platform;
use crate::types::{CtError, CtResult};

pub fn builtin_tasks() -> Vec<TaskConfig> {
    vec![
        TaskConfig {
            usage: Some("ct scan <target> [--ports 80,443] [--json]".to_string()),
            ..TaskConfig::new(
                "scan",
                "Run scanning tasks (nmap, http checks)",
                "scan_nmap.py",
                &["nmap"],
            )
        },
        TaskConfig::new(
            "dns",
            "Run DNS lookups and record gathering",
            "dns_lookup.py",
            &["nslookup"],
        ),
        TaskConfig::new(
            "osint",
            "Run OSINT tasks and data enrichment",
            "osint_domain.py",
            &["whois"],
        ),
        TaskConfig::new(
            "recon",
            "Run recon tasks (subdomain discovery, crawl)",
            "recon_subdomains.py",
            &[],
        ),
    ]
}

/// Built-in tasks overlaid with the ones from the settings file, in display
/// order (built-ins first).
pub fn all_tasks(config: &Config) -> Vec<TaskConfig> {
    let mut tasks = builtin_tasks();
    for custom in &config.tasks {
        match tasks.iter_mut().find(|t| t.name == custom.name) {
            Some(existing) => *existing = custom.clone(),
            None => tasks.push(custom.clone()),
        }
    }
    tasks
}

pub fn find_task(config: &Config, name: &str) -> CtResult<TaskConfig> {
    all_tasks(config)
        .into_iter()
        .find(|t| t.name == name)
        .ok_or_else(|| CtError::UnknownTask(name.to_string()))
}

/// Catalog entry for a dependency name. `paths` supplies the executable used
/// for the presence check.
pub fn dependency(name: &str, paths: &PathsConfig) -> Option<Dependency> {
    let dep = match name {
        "nmap" => Dependency {
            name: "nmap".to_string(),
            check_cmd: paths.nmap.clone(),
            description: "port scanner".to_string(),
            installers: base_installers("nmap", "Nmap.Nmap", "nmap"),
        },
        "nslookup" => Dependency {
            name: "nslookup".to_string(),
            check_cmd: paths.nslookup.clone(),
            description: "DNS lookup utility".to_string(),
            installers: HashMap::from([
                (
                    Platform::Darwin,
                    vec![Installer::new("brew", &["brew", "install", "bind"])],
                ),
                (
                    Platform::Linux,
                    vec![
                        Installer::new("apt", &["sudo", "apt-get", "install", "-y", "dnsutils"]),
                        Installer::new("dnf", &["sudo", "dnf", "install", "-y", "bind-utils"]),
                        Installer::new("pacman", &["sudo", "pacman", "-S", "--noconfirm", "bind"]),
                    ],
                ),
                (
                    Platform::Windows,
                    vec![
                        Installer::new("winget", &["winget", "install", "--id", "ISC.Bind", "-e"]),
                        Installer::new("choco", &["choco", "install", "-y", "bind"]),
                    ],
                ),
            ]),
        },
        "whois" => Dependency {
            name: "whois".to_string(),
            check_cmd: paths.whois.clone(),
            description: "WHOIS client".to_string(),
            installers: base_installers("whois", "Sysinternals.Whois", "whois"),
        },
        _ => return None,
    };
    Some(dep)
}

/// Resolve a task's dependency names against the catalog
pub fn dependencies_for(task: &TaskConfig, paths: &PathsConfig) -> CtResult<Vec<Dependency>> {
    task.dependencies
        .iter()
        .map(|name| {
            dependency(name, paths).ok_or_else(|| {
                CtError::Config(format!(
                    "task '{}' depends on unknown tool '{}'",
                    task.name, name
                ))
            })
        })
        .collect()
}
