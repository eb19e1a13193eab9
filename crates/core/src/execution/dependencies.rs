//! Host tool dependencies
//!
//! Before a task runs, every tool it needs must be on `PATH`. Missing tools are
//! offered for installation through the platform's package manager, one at a
//! time and only with the operator's consent. Resolution is strictly sequential
//! and stops at the first failure.

use std::collections::HashMap;
use std::io::{self, BufRead, Stderr, StdinLock, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::platform::{find_executable, Platform};
use crate::types::{CtError, CtResult};

/// One concrete way of installing a dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installer {
    pub name: String,
    /// Program followed by its arguments
    pub command: Vec<String>,
}

impl Installer {
    pub fn new(name: &str, command: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            command: command.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }
}

/// A command-line tool a task needs before it can run
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: String,
    /// Executable looked up on `PATH` to decide whether the tool is present
    pub check_cmd: String,
    pub description: String,
    /// Installer candidates per platform, tried in order
    pub installers: HashMap<Platform, Vec<Installer>>,
}

impl Dependency {
    pub fn installers_for(&self, platform: Platform) -> &[Installer] {
        self.installers
            .get(&platform)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// The host as seen by the resolver: executable lookup and installer runs
pub trait Host {
    fn find_executable(&self, name: &str) -> Option<PathBuf>;

    /// Run an installer with the console attached. `Ok(false)` means it ran and
    /// reported failure.
    fn run_installer(&self, installer: &Installer) -> io::Result<bool>;
}

/// The real machine
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl Host for SystemHost {
    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        find_executable(name)
    }

    fn run_installer(&self, installer: &Installer) -> io::Result<bool> {
        let Some((program, args)) = installer.command.split_first() else {
            return Ok(false);
        };
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        Ok(status.success())
    }
}

/// Checks and installs dependencies, asking the operator before each install
pub struct DependencyResolver<H, R, W> {
    host: H,
    platform: Platform,
    input: R,
    output: W,
}

impl DependencyResolver<SystemHost, StdinLock<'static>, Stderr> {
    /// Resolver bound to this machine's `PATH` and console.
    ///
    /// Blocks on standard input whenever something is missing, so only use it
    /// from an interactive context.
    pub fn interactive() -> Self {
        Self::new(SystemHost, Platform::current(), io::stdin().lock(), io::stderr())
    }
}

impl<H: Host, R: BufRead, W: Write> DependencyResolver<H, R, W> {
    pub fn new(host: H, platform: Platform, input: R, output: W) -> Self {
        Self {
            host,
            platform,
            input,
            output,
        }
    }

    /// Make sure every dependency is present, in order.
    ///
    /// Does not re-check a dependency after installing it.
    pub fn ensure(&mut self, deps: &[Dependency]) -> CtResult<()> {
        for dep in deps {
            if let Some(path) = self.host.find_executable(&dep.check_cmd) {
                debug!(dependency = %dep.name, path = %path.display(), "dependency present");
                continue;
            }

            warn!(dependency = %dep.name, check_cmd = %dep.check_cmd, "dependency missing");
            writeln!(self.output, "{} is not installed ({}).", dep.name, dep.description)?;
            if !self.prompt_consent("Install now?")? {
                return Err(CtError::DependencyRefused(dep.name.clone()));
            }

            self.install(dep)?;
        }
        Ok(())
    }

    fn install(&mut self, dep: &Dependency) -> CtResult<()> {
        let installers = dep.installers_for(self.platform);
        if installers.is_empty() {
            return Err(CtError::NoInstaller {
                dependency: dep.name.clone(),
                platform: self.platform,
            });
        }

        for installer in installers {
            let Some(program) = installer.program() else {
                continue;
            };
            if self.host.find_executable(program).is_none() {
                debug!(installer = %installer.name, program, "installer not available");
                continue;
            }

            writeln!(
                self.output,
                "Running {}: {}",
                installer.name,
                installer.display_command()
            )?;
            info!(dependency = %dep.name, installer = %installer.name, "running installer");

            return match self.host.run_installer(installer) {
                Ok(true) => Ok(()),
                Ok(false) => Err(CtError::InstallerFailed(installer.name.clone())),
                Err(e) => {
                    warn!(installer = %installer.name, error = %e, "installer could not start");
                    Err(CtError::InstallerFailed(installer.name.clone()))
                }
            };
        }

        Err(CtError::NoPackageManager(dep.name.clone()))
    }

    fn prompt_consent(&mut self, message: &str) -> CtResult<bool> {
        write!(self.output, "{} [y/N]: ", message)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no answer on standard input",
            )
            .into());
        }
        let answer = line.trim().to_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

/// Installer table shared by most tools: brew, apt/dnf/pacman, winget/choco.
pub fn base_installers(
    pkg: &str,
    winget_id: &str,
    choco_pkg: &str,
) -> HashMap<Platform, Vec<Installer>> {
    HashMap::from([
        (
            Platform::Darwin,
            vec![Installer::new("brew", &["brew", "install", pkg])],
        ),
        (
            Platform::Linux,
            vec![
                Installer::new("apt", &["sudo", "apt-get", "install", "-y", pkg]),
                Installer::new("dnf", &["sudo", "dnf", "install", "-y", pkg]),
                Installer::new("pacman", &["sudo", "pacman", "-S", "--noconfirm", pkg]),
            ],
        ),
        (
            Platform::Windows,
            vec![
                Installer::new("winget", &["winget", "install", "--id", winget_id, "-e"]),
                Installer::new("choco", &["choco", "install", "-y", choco_pkg]),
            ],
        ),
    ])
}
