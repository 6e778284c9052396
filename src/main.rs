use anyhow::{anyhow, Result};
use clap::Parser;
use colored::*;
use mdprint::{dispatch, extract, pages, render};
use mdprint::{Capabilities, Dispatcher, PageGeometry, Platform, PrintJob, RenderError, Renderer};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Input file missing or no input specified.
const EXIT_BAD_INPUT: i32 = 2;
/// Rendering succeeded but every dispatch mechanism failed.
const EXIT_DISPATCH_FAILED: i32 = 3;

#[derive(Parser)]
#[command(name = "mdprint")]
#[command(about = "Print a Markdown or HTML document by rendering it to a Letter-sized PDF")]
#[command(version = "0.1.0")]
struct Args {
    /// Path to a markdown file
    file: Option<PathBuf>,

    /// Path to a pre-rendered HTML file (alternative to the markdown file)
    #[arg(long = "html", value_name = "PATH")]
    html: Option<PathBuf>,

    /// Path where the PDF should be saved (skips temp-file cleanup)
    #[arg(long = "pdf", value_name = "PATH")]
    pdf: Option<PathBuf>,

    /// Printer name (optional, defaults to the system printer)
    #[arg(short = 'p', long = "printer")]
    printer: Option<String>,

    /// Pages to print, 1-indexed with inclusive ranges, e.g. "1-3,5,7-9"
    #[arg(long = "pages", value_name = "SPEC")]
    pages: Option<String>,

    /// List available printers and exit
    #[arg(long = "list-printers")]
    list_printers: bool,

    /// Seconds to wait after issuing the print command before cleanup
    #[arg(short = 'w', long = "wait-seconds", default_value = "3.0", value_parser = parse_wait_seconds)]
    wait_seconds: f64,
}

/// Upper bound on the post-dispatch grace period, so an absurd
/// `--wait-seconds` cannot overflow `Duration` or hang the run.
const MAX_WAIT_SECONDS: f64 = 600.0;

fn parse_wait_seconds(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|_| "Not a number.")?;
    if !value.is_finite() || value < 0.0 {
        return Err("Must be a finite, zero or positive number.".to_string());
    }
    Ok(value)
}

/// Grace period between queueing the job and temp cleanup: floor 1s,
/// capped at [`MAX_WAIT_SECONDS`].
fn spool_grace(wait_seconds: f64) -> Duration {
    Duration::from_secs_f64(wait_seconds.clamp(1.0, MAX_WAIT_SECONDS))
}

struct Input {
    html: String,
    title: String,
}

async fn load_input(args: &Args, geometry: &PageGeometry) -> Result<Input> {
    if let Some(html_path) = &args.html {
        let title = file_stem(html_path);
        let html = read_input_file(html_path, "HTML").await?;
        Ok(Input { html, title })
    } else if let Some(md_path) = &args.file {
        let title = file_stem(md_path);
        let markdown = read_input_file(md_path, "markdown").await?;
        let html = render::markdown_to_document(&markdown, &title, geometry);
        Ok(Input { html, title })
    } else {
        Err(anyhow!("either a markdown file or --html must be provided"))
    }
}

async fn read_input_file(path: &Path, kind: &str) -> Result<String> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(anyhow!("{} file not found: {}", kind, path.display())),
    }
    fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("failed to read {} file {}: {}", kind, path.display(), e))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

async fn run(args: Args) -> Result<i32> {
    let platform = Platform::current();

    if args.list_printers {
        for name in dispatch::list_printers(platform).await {
            println!("{}", name);
        }
        return Ok(0);
    }

    let geometry = PageGeometry::default();

    // Validate input before creating the working directory, so a bad path
    // leaves nothing behind.
    let input = match load_input(&args, &geometry).await {
        Ok(input) => input,
        Err(err) => {
            error!("{}", format!("Error: {}", err).red());
            return Ok(EXIT_BAD_INPUT);
        }
    };

    let caps = Capabilities::detect();
    let workdir = tempfile::Builder::new().prefix("mdprint_").tempdir()?;

    let (pdf_path, cleanup_pdf) = match &args.pdf {
        Some(path) => (path.clone(), false),
        None => (workdir.path().join(format!("{}.pdf", input.title)), true),
    };
    let html_path = workdir.path().join(format!("{}.html", input.title));

    let renderer = Renderer::new(&caps, geometry);
    info!(
        "Rendering PDF ({}x{}in, {}in margins)...",
        geometry.width_in, geometry.height_in, geometry.margin_in
    );
    match renderer.render_or_fallback(&input.html, &pdf_path, &html_path).await {
        Ok(()) => {
            info!("PDF saved to: {}", pdf_path.display().to_string().blue());
        }
        Err(RenderError::FallbackToManual(saved)) => {
            info!("HTML preview saved to: {}", saved.display().to_string().blue());
            dispatch::open_in_browser(&saved).await;
            // The browser needs the file to stick around.
            let kept = workdir.keep();
            info!("Keeping working directory: {}", kept.display());
            return Ok(0);
        }
        Err(err) => return Err(err.into()),
    }

    // Page selection; any failure here degrades to printing the whole document.
    let mut print_path = pdf_path.clone();
    if let Some(spec) = &args.pages {
        match pages::parse_page_spec(spec) {
            Ok(intervals) if intervals.is_empty() => {}
            Ok(intervals) => {
                let selected = workdir.path().join(format!("{}.pages.pdf", input.title));
                match extract::extract_to_file(&pdf_path, &selected, &intervals).await {
                    Ok(()) => print_path = selected,
                    Err(err) => {
                        warn!("Page extraction failed ({}); printing all pages", err)
                    }
                }
            }
            Err(err) => warn!("{}; printing all pages", err),
        }
    }

    let dispatcher = Dispatcher::new(platform, &caps);
    let job = PrintJob {
        pdf_path: print_path.clone(),
        printer: args.printer.clone(),
    };

    info!("Sending to printer...");
    match dispatcher.dispatch(&job).await {
        Ok(()) => {
            // Give the spooler time to read the file before the temp dir goes away
            tokio::time::sleep(spool_grace(args.wait_seconds)).await;
            info!("Print command issued.");
            Ok(0)
        }
        Err(err) => {
            error!("{}", format!("Error sending to printer: {}", err).red());
            if cleanup_pdf || print_path != pdf_path {
                // Preserve the rendered artifact for manual printing.
                let kept = workdir.keep();
                info!("Keeping working directory: {}", kept.display());
            }
            info!("Saved PDF at: {}", print_path.display().to_string().blue());
            Ok(EXIT_DISPATCH_FAILED)
        }
    }
}

#[tokio::main]
async fn main() {
    // Set up logging with chromiumoxide errors suppressed
    let filter = EnvFilter::from_default_env()
        .add_directive("chromiumoxide::conn=off".parse().unwrap())
        .add_directive("chromiumoxide::handler=off".parse().unwrap())
        .add_directive("mdprint=info".parse().unwrap());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{}", format!("Error: {}", e).red());
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_seconds_rejects_non_finite_values() {
        assert!(parse_wait_seconds("inf").is_err());
        assert!(parse_wait_seconds("-inf").is_err());
        assert!(parse_wait_seconds("NaN").is_err());
        assert!(parse_wait_seconds("-1").is_err());
        assert!(parse_wait_seconds("abc").is_err());
    }

    #[test]
    fn wait_seconds_accepts_ordinary_values() {
        assert_eq!(parse_wait_seconds("3.0").unwrap(), 3.0);
        assert_eq!(parse_wait_seconds("0").unwrap(), 0.0);
        assert_eq!(parse_wait_seconds("1e300").unwrap(), 1e300);
    }

    #[test]
    fn spool_grace_has_a_floor_and_a_ceiling() {
        assert_eq!(spool_grace(0.0), Duration::from_secs(1));
        assert_eq!(spool_grace(3.0), Duration::from_secs_f64(3.0));
        // Huge finite values must clamp instead of overflowing Duration.
        assert_eq!(spool_grace(1e300), Duration::from_secs_f64(MAX_WAIT_SECONDS));
        assert_eq!(spool_grace(f64::MAX), Duration::from_secs_f64(MAX_WAIT_SECONDS));
    }
}
