//! Collaborator seams
//!
//! The reconciliation engine never talks to the OS or the network directly.
//! It goes through three traits, each with one production implementation:
//!
//! | Trait            | Production impl   | Backing tool |
//! |------------------|-------------------|--------------|
//! | `ShareMounter`   | `NetUseMounter`   | `net use` |
//! | `PackageRuntime` | `WindowsRuntime`  | package executables, `expand.exe` |
//! | `Fetcher`        | `HttpFetcher`     | reqwest (blocking) |
//!
//! Tests substitute in-memory fakes.

use crate::error::{DeployError, Result};
use crate::installer_args::{ExpandCabArgs, InstallerArgs};
use crate::process::{is_success_code, run_process, run_process_redacted};
use crate::types::Credentials;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

// ============================================================================
// Traits
// ============================================================================

/// Network share access.
pub trait ShareMounter {
    /// Connect to `unc_path` and return the local root to read from.
    fn mount(&self, unc_path: &str, credentials: &Credentials) -> Result<PathBuf>;

    /// Release a previously mounted root.
    fn unmount(&self, local_root: &Path) -> Result<()>;
}

/// Low-level package installation primitives.
pub trait PackageRuntime {
    /// Run an installer and block until it exits. Returns the exit code.
    fn run_installer(&self, program: &Path, args: &[String]) -> Result<i32>;

    /// Expand an archive into `destination`, creating it if needed.
    fn extract_archive(&self, archive: &Path, destination: &Path) -> Result<()>;
}

/// HTTP access.
pub trait Fetcher {
    /// GET a URL and return the body as text.
    fn fetch_text(&self, url: &str) -> Result<String>;

    /// GET a URL into `destination`. Returns the number of bytes written.
    fn download(&self, url: &str, destination: &Path) -> Result<u64>;

    /// POST a url-encoded form and return the body as text.
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String>;
}

/// Run a typed installer invocation and map a failing exit code to
/// `InstallFailed`.
pub fn run_installer_args<R, A>(runtime: &R, args: &A) -> Result<()>
where
    R: PackageRuntime + ?Sized,
    A: InstallerArgs,
{
    let program = args.program();
    let code = runtime.run_installer(&program, &args.to_cli_args())?;
    if is_success_code(code) {
        Ok(())
    } else {
        Err(DeployError::install_failed(format!(
            "{} ({}) exited with code {}",
            args.label(),
            program.display(),
            code
        )))
    }
}

/// Whether a distribution path is a UNC share (`\\server\share`).
pub fn is_unc_path(path: &str) -> bool {
    path.starts_with("\\\\") || path.starts_with("//")
}

// ============================================================================
// Windows implementations
// ============================================================================

/// Mounts shares with `net use`, reading them through their UNC path.
#[derive(Debug, Default, Clone)]
pub struct NetUseMounter;

impl ShareMounter for NetUseMounter {
    fn mount(&self, unc_path: &str, credentials: &Credentials) -> Result<PathBuf> {
        let mut args = vec!["use".to_string(), unc_path.to_string()];
        if !credentials.is_empty() {
            args.push(credentials.password.clone());
            args.push(format!("/user:{}", credentials.user));
        }
        args.push("/persistent:no".to_string());

        let output = run_process_redacted(Path::new("net.exe"), &args, &[&credentials.password])
            .map_err(|e| DeployError::share_unavailable(format!("{}: {}", unc_path, e)))?;

        // 0 = connected; an already-connected share reports an error but stays usable
        let root = PathBuf::from(unc_path);
        if output.exit_code != Some(0) && !root.exists() {
            return Err(DeployError::share_unavailable(format!(
                "net use {} failed: {}",
                unc_path,
                output.stderr.trim()
            )));
        }
        if !root.exists() {
            return Err(DeployError::share_unavailable(format!(
                "{} is not reachable after mount",
                unc_path
            )));
        }

        info!("Mounted distribution share {}", unc_path);
        Ok(root)
    }

    fn unmount(&self, local_root: &Path) -> Result<()> {
        let root = local_root.display().to_string();
        let output = run_process(Path::new("net.exe"), ["use", root.as_str(), "/delete", "/y"])?;
        if output.exit_code != Some(0) {
            return Err(DeployError::share_unavailable(format!(
                "net use {} /delete failed: {}",
                root,
                output.stderr.trim()
            )));
        }
        info!("Unmounted distribution share {}", root);
        Ok(())
    }
}

/// Runs installers and `expand.exe` as blocking child processes.
#[derive(Debug, Default, Clone)]
pub struct WindowsRuntime;

impl PackageRuntime for WindowsRuntime {
    fn run_installer(&self, program: &Path, args: &[String]) -> Result<i32> {
        info!("Running installer {} {:?}", program.display(), args);
        let output = run_process(program, args)?;
        Ok(output.exit_code.unwrap_or(-1))
    }

    fn extract_archive(&self, archive: &Path, destination: &Path) -> Result<()> {
        fs::create_dir_all(destination)?;
        let args = ExpandCabArgs::new(archive, destination);
        let output = run_process(&args.program(), args.to_cli_args())?;
        output.ensure_success(&format!("expand {}", archive.display()))
    }
}

/// Blocking HTTP client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("drvdeploy/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| DeployError::config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn download_error(url: &str, e: impl std::fmt::Display) -> DeployError {
    DeployError::download_failed(format!("{}: {}", url, e))
}

impl Fetcher for HttpFetcher {
    fn fetch_text(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        self.client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| download_error(url, e))
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        debug!("GET {} -> {}", url, destination.display());
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| download_error(url, e))?;

        // Only a complete transfer is renamed into place.
        let partial = destination.with_extension("part");
        let written = {
            let mut file = fs::File::create(&partial)?;
            let written = response.copy_to(&mut file).map_err(|e| {
                let _ = fs::remove_file(&partial);
                download_error(url, e)
            })?;
            file.flush()?;
            written
        };
        fs::rename(&partial, destination)?;

        info!("Downloaded {} ({} bytes)", url, written);
        Ok(written)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String> {
        debug!("POST {}", url);
        self.client
            .post(url)
            .form(form)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| download_error(url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingRuntime {
        code: i32,
        calls: RefCell<Vec<(PathBuf, Vec<String>)>>,
    }

    impl PackageRuntime for RecordingRuntime {
        fn run_installer(&self, program: &Path, args: &[String]) -> Result<i32> {
            self.calls.borrow_mut().push((program.to_path_buf(), args.to_vec()));
            Ok(self.code)
        }

        fn extract_archive(&self, _archive: &Path, _destination: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_run_installer_args_maps_exit_codes() {
        use crate::installer_args::NvidiaSilentArgs;

        let args = NvidiaSilentArgs { package: PathBuf::from("nv.exe") };

        let ok = RecordingRuntime { code: 0, calls: RefCell::new(Vec::new()) };
        assert!(run_installer_args(&ok, &args).is_ok());
        assert_eq!(ok.calls.borrow()[0].1, vec!["-s", "-noreboot"]);

        let reboot = RecordingRuntime { code: 3010, calls: RefCell::new(Vec::new()) };
        assert!(run_installer_args(&reboot, &args).is_ok());

        let failed = RecordingRuntime { code: 1, calls: RefCell::new(Vec::new()) };
        let err = run_installer_args(&failed, &args).unwrap_err();
        assert!(matches!(err, DeployError::InstallFailed(_)));
    }

    #[test]
    fn test_is_unc_path() {
        assert!(is_unc_path("\\\\srv\\deploy"));
        assert!(is_unc_path("//srv/deploy"));
        assert!(!is_unc_path("C:\\deploy"));
        assert!(!is_unc_path("/srv/deploy"));
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new(Duration::from_secs(30)).is_ok());
    }
}
