use anyhow::{anyhow, bail, Result};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::capabilities::Capabilities;

/// Upper bound on any single dispatch attempt, so a wedged viewer or shell
/// verb cannot hang the run.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Posix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }
}

/// One print request: a rendered PDF and an optional target printer.
/// Lives for a single dispatch sequence and is never retried across runs.
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub pdf_path: PathBuf,
    pub printer: Option<String>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("neither 'lp' nor 'lpr' was found on PATH")]
    NoPrintCommand,
    #[error("every print mechanism failed; PDF kept at {0}")]
    Exhausted(PathBuf),
}

/// One platform-specific way of handing a PDF to the print subsystem.
///
/// The fallback order is a plain list built by [`mechanism_plan`], iterated
/// by [`Dispatcher::dispatch`]; each variant only knows how to turn a
/// [`PrintJob`] into a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mechanism {
    /// SumatraPDF silent printing (`-print-to` / `-print-to-default`).
    SumatraPdf(PathBuf),
    /// PowerShell `Start-Process -Verb Print` (ShellExecute print verb).
    ShellPrintVerb,
    /// Generic shell-namespace verb invocation through `Shell.Application`.
    ComInvokeVerb,
    /// `rundll32 shell32.dll,ShellExec_RunDLL` last resort.
    RundllShellExec,
    /// POSIX queueing via `lp` or `lpr`.
    QueueCommand(PathBuf),
}

impl Mechanism {
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::SumatraPdf(_) => "SumatraPDF",
            Mechanism::ShellPrintVerb => "Start-Process print verb",
            Mechanism::ComInvokeVerb => "Shell.Application print verb",
            Mechanism::RundllShellExec => "rundll32 ShellExec_RunDLL",
            Mechanism::QueueCommand(_) => "print queue command",
        }
    }

    /// Whether this mechanism can target a printer by name; the others only
    /// reach the system default printer.
    pub fn supports_named_printer(&self) -> bool {
        matches!(self, Mechanism::SumatraPdf(_) | Mechanism::QueueCommand(_))
    }

    /// Builds the argv for this mechanism. Kept pure so the flag translation
    /// per mechanism is testable without spawning anything.
    pub fn command_line(&self, job: &PrintJob) -> Vec<String> {
        let pdf = job.pdf_path.display().to_string();

        match self {
            Mechanism::SumatraPdf(exe) => {
                let mut argv = vec![exe.display().to_string()];
                match &job.printer {
                    Some(name) => {
                        argv.push("-print-to".to_string());
                        argv.push(name.clone());
                    }
                    None => argv.push("-print-to-default".to_string()),
                }
                argv.push("-silent".to_string());
                argv.push(pdf);
                argv
            }
            Mechanism::ShellPrintVerb => vec![
                "powershell".to_string(),
                "-NoProfile".to_string(),
                "-Command".to_string(),
                format!(
                    "Start-Process -FilePath {} -Verb Print | Out-Null",
                    ps_quote(&pdf)
                ),
            ],
            Mechanism::ComInvokeVerb => {
                let dir = job
                    .pdf_path
                    .parent()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| ".".to_string());
                let file = job
                    .pdf_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| pdf.clone());
                vec![
                    "powershell".to_string(),
                    "-NoProfile".to_string(),
                    "-Command".to_string(),
                    format!(
                        "(New-Object -ComObject Shell.Application).Namespace({}).ParseName({}).InvokeVerb('print')",
                        ps_quote(&dir),
                        ps_quote(&file)
                    ),
                ]
            }
            Mechanism::RundllShellExec => vec![
                "rundll32".to_string(),
                "shell32.dll,ShellExec_RunDLL".to_string(),
                pdf,
                "print".to_string(),
            ],
            Mechanism::QueueCommand(cmd) => {
                let mut argv = vec![cmd.display().to_string()];
                if let Some(name) = &job.printer {
                    // lp selects with -d, lpr with -P
                    let is_lp = cmd
                        .file_name()
                        .map(|n| n == "lp")
                        .unwrap_or(false);
                    argv.push(if is_lp { "-d" } else { "-P" }.to_string());
                    argv.push(name.clone());
                }
                argv.push(pdf);
                argv
            }
        }
    }
}

fn ps_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Ordered fallback chain for a platform, given what the capability probe
/// found.
pub fn mechanism_plan(platform: Platform, caps: &Capabilities) -> Vec<Mechanism> {
    match platform {
        Platform::Windows => {
            let mut plan = Vec::new();
            if let Some(exe) = &caps.sumatra {
                plan.push(Mechanism::SumatraPdf(exe.clone()));
            }
            plan.push(Mechanism::ShellPrintVerb);
            plan.push(Mechanism::ComInvokeVerb);
            plan.push(Mechanism::RundllShellExec);
            plan
        }
        Platform::Posix => caps
            .lp
            .as_ref()
            .or(caps.lpr.as_ref())
            .map(|cmd| vec![Mechanism::QueueCommand(cmd.clone())])
            .unwrap_or_default(),
    }
}

/// Walks the mechanism plan for one job, stopping at the first success.
pub struct Dispatcher {
    plan: Vec<Mechanism>,
}

impl Dispatcher {
    pub fn new(platform: Platform, caps: &Capabilities) -> Self {
        Self {
            plan: mechanism_plan(platform, caps),
        }
    }

    /// Attempts each mechanism in order. A failure or timeout of one
    /// mechanism falls through to the next; success means the job was
    /// queued, not that anything physically printed.
    pub async fn dispatch(&self, job: &PrintJob) -> Result<(), DispatchError> {
        if self.plan.is_empty() {
            return Err(DispatchError::NoPrintCommand);
        }

        for mechanism in &self.plan {
            if let Some(name) = &job.printer {
                if !mechanism.supports_named_printer() {
                    warn!(
                        "{} cannot target printer '{}'; using the default printer",
                        mechanism.name(),
                        name
                    );
                }
            }

            info!("Printing via {} ...", mechanism.name().green());
            match run_mechanism(mechanism, job).await {
                Ok(()) => {
                    info!("Print job queued via {}", mechanism.name().green());
                    return Ok(());
                }
                Err(err) => warn!("{} failed: {}", mechanism.name(), err),
            }
        }

        Err(DispatchError::Exhausted(job.pdf_path.clone()))
    }
}

async fn run_mechanism(mechanism: &Mechanism, job: &PrintJob) -> Result<()> {
    let argv = mechanism.command_line(job);
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command line"))?;

    info!("Running: {}", argv.join(" "));

    let status = tokio::time::timeout(
        ATTEMPT_TIMEOUT,
        Command::new(program).args(args).status(),
    )
    .await
    .map_err(|_| anyhow!("timed out after {:?}", ATTEMPT_TIMEOUT))??;

    if !status.success() {
        bail!("exited with {}", status);
    }
    Ok(())
}

/// Enumerates printer names, one per returned string. Enumeration problems
/// degrade to an empty list with a warning; listing must never abort a run.
pub async fn list_printers(platform: Platform) -> Vec<String> {
    let output = match platform {
        Platform::Windows => {
            Command::new("powershell")
                .args([
                    "-NoProfile",
                    "-Command",
                    "Get-Printer | Select-Object -ExpandProperty Name",
                ])
                .output()
                .await
        }
        Platform::Posix => Command::new("lpstat").arg("-e").output().await,
    };

    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect(),
        Ok(out) => {
            warn!("Printer enumeration exited with {}", out.status);
            Vec::new()
        }
        Err(err) => {
            warn!("Printer enumeration failed: {}", err);
            Vec::new()
        }
    }
}

/// Opens a file with the platform's default handler, for the manual-print
/// fallback. Failure to open is only a warning.
pub async fn open_in_browser(path: &Path) {
    info!(
        "Opening in default browser for manual printing: {}",
        path.display().to_string().blue()
    );

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]).arg(path);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(path);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(path);
        c
    };

    if let Err(err) = command.spawn() {
        warn!("Failed to open browser: {}", err);
    }
}
