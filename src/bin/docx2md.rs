//! CLI binary for kloudvin-docx2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use kloudvin_docx2md::sink::{self, DEFAULT_CONTAINER};
use kloudvin_docx2md::{
    convert_input, convert_to_file, ConversionConfig, ConversionOutput,
    ConversionProgressCallback, DirectoryImageSink, ImageSink, MemoryImageSink, ProgressCallback,
    Stage, StyleMap,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while the document is parsed, then
/// a bar over the image uploads. Uploads finish out of order, so the bar
/// only counts.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Uploading");
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_images: usize) {
        if total_images > 0 {
            self.activate_bar(total_images);
            self.bar.println(format!(
                "{} {}",
                cyan("◆"),
                bold(&format!("Document has {total_images} embedded images"))
            ));
        }
    }

    fn on_stage(&self, stage: Stage) {
        let label = match stage {
            Stage::Extract => "parsing document",
            Stage::UploadImages => "uploading images",
            Stage::Cleanup => "cleaning up",
            Stage::Render => "rendering markdown",
            Stage::Normalize => "normalizing",
        };
        self.bar.set_message(label);
    }

    fn on_image_complete(&self, index: usize, total: usize, url: &str) {
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}",
            green("✓"),
            index,
            total,
            dim(url),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, uploaded: usize, markdown_len: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} converted  {}  {} images stored",
                green("✔"),
                dim(&format!("{markdown_len} chars")),
                bold(&uploaded.to_string())
            );
        } else {
            eprintln!(
                "{} converted  {}  {} images stored  ({} failed)",
                cyan("⚠"),
                dim(&format!("{markdown_len} chars")),
                bold(&uploaded.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (stdout), images to Azure Blob Storage
  export AZURE_STORAGE_CONNECTION_STRING="DefaultEndpointsProtocol=https;AccountName=…"
  docx2md post.docx

  # Convert to file, images into a local directory served at a public URL
  docx2md post.docx -o post.md --image-dir public/images \
      --image-base-url https://kloudvin.com/images

  # Convert from URL
  docx2md https://example.com/drafts/post.docx -o post.md

  # Dry run: keep images in memory, inspect the result as JSON
  docx2md --sink memory --json post.docx

  # Custom style map (user rules win over the defaults)
  docx2md --style-map styles.txt post.docx

STYLE MAP FILE:
  One rule per line, `#` starts a comment:
    p[style-name='Callout'] => blockquote:fresh
    p[style-name='Terminal'] => pre
    r[style-name='Keyboard'] => code
    p[style-name='Draft Note'] => !

IMAGE SINKS:
  auto     Azure if a connection string is set, else --image-dir (default)
  azure    Azure Blob Storage, container --container (default "images")
  dir      Local directory + public base URL
  memory   Keep images in memory (dry run; URLs are memory://…)

ENVIRONMENT VARIABLES:
  AZURE_STORAGE_CONNECTION_STRING  Azure Storage connection string
  DOCX2MD_IMAGE_CONTAINER          Blob container name
  DOCX2MD_IMAGE_DIR                Directory for the `dir` sink
  DOCX2MD_IMAGE_BASE_URL           Public URL prefix for the `dir` sink
  RUST_LOG                         Override the log filter (e.g. debug)
"#;

/// Convert Word documents to Markdown for the KloudVin blog.
#[derive(Parser, Debug)]
#[command(
    name = "docx2md",
    version,
    about = "Convert .docx files and URLs to Markdown, offloading images to blob storage",
    long_about = "Convert Word (.docx) documents, local or remote, to clean Markdown. \
Embedded images are uploaded to an image sink (Azure Blob Storage or a local directory) and \
linked by URL; table-of-contents artifacts and page furniture are removed and the title is \
extracted separately.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local .docx file path or HTTP/HTTPS URL.
    input: String,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "DOCX2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Where embedded images are stored.
    #[arg(long, env = "DOCX2MD_SINK", value_enum, default_value = "auto")]
    sink: SinkArg,

    /// Azure Storage connection string for the `azure` sink.
    #[arg(long, env = "AZURE_STORAGE_CONNECTION_STRING", hide_env_values = true)]
    azure_connection_string: Option<String>,

    /// Blob container for the `azure` sink.
    #[arg(long, env = "DOCX2MD_IMAGE_CONTAINER", default_value = DEFAULT_CONTAINER)]
    container: String,

    /// Directory for the `dir` sink.
    #[arg(long, env = "DOCX2MD_IMAGE_DIR")]
    image_dir: Option<PathBuf>,

    /// Public URL prefix for images written by the `dir` sink.
    #[arg(long, env = "DOCX2MD_IMAGE_BASE_URL")]
    image_base_url: Option<String>,

    /// File of extra style-map rules, applied before the defaults.
    #[arg(long, env = "DOCX2MD_STYLE_MAP")]
    style_map: Option<PathBuf>,

    /// Number of concurrent image uploads.
    #[arg(short, long, env = "DOCX2MD_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-image upload timeout in seconds.
    #[arg(long, env = "DOCX2MD_UPLOAD_TIMEOUT", default_value_t = 30)]
    upload_timeout: u64,

    /// Retries per image after a failed upload.
    #[arg(long, env = "DOCX2MD_UPLOAD_RETRIES", default_value_t = 0)]
    upload_retries: u32,

    /// Keep the first line in the body instead of extracting a title.
    #[arg(long, env = "DOCX2MD_NO_TITLE")]
    no_title: bool,

    /// Output structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long, env = "DOCX2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCX2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCX2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCX2MD_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCX2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SinkArg {
    Auto,
    Azure,
    Dir,
    Memory,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run conversion ───────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let output = convert_to_file(&cli.input, output_path, &config)
            .await
            .context("Conversion failed")?;

        if cli.json {
            print_json(&output)?;
        }
        if !cli.quiet {
            print_warnings(&output);
            eprintln!(
                "{}  {}  {} images  {}ms  →  {}",
                if output.warnings.is_empty() {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                title_label(&output),
                output.image_count,
                output.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let output = convert_input(&cli.input, &config)
            .await
            .context("Conversion failed")?;

        if cli.json {
            print_json(&output)?;
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.markdown.as_bytes())
                .context("Failed to write to stdout")?;
            // Ensure a trailing newline on stdout.
            if !output.markdown.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }

        if !cli.quiet && !cli.json {
            print_warnings(&output);
            if !show_progress {
                eprintln!(
                    "Converted {} ({} images) in {}ms",
                    title_label(&output),
                    output.image_count,
                    output.stats.total_duration_ms
                );
            }
        }
    }

    Ok(())
}

fn print_json(output: &ConversionOutput) -> Result<()> {
    let json = serde_json::to_string_pretty(output).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

fn print_warnings(output: &ConversionOutput) {
    for w in &output.warnings {
        eprintln!("  {} {}", cyan("⚠"), w);
    }
}

fn title_label(output: &ConversionOutput) -> String {
    if output.title.is_empty() {
        dim("(untitled)")
    } else {
        format!("\"{}\"", output.title)
    }
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .upload_concurrency(cli.concurrency)
        .upload_timeout_secs(cli.upload_timeout)
        .max_upload_retries(cli.upload_retries)
        .extract_title(!cli.no_title)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.style_map {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read style map from {:?}", path))?;
        let rules = StyleMap::parse(&text)
            .with_context(|| format!("Invalid style map {:?}", path))?;
        builder = builder.style_overrides(rules);
    }

    builder = builder.sink(build_sink(cli)?);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Resolve `--sink` into a concrete sink.
fn build_sink(cli: &Cli) -> Result<Arc<dyn ImageSink>> {
    let dir_sink = |dir: &PathBuf| -> Arc<dyn ImageSink> {
        let base = cli
            .image_base_url
            .clone()
            .unwrap_or_else(|| dir.display().to_string());
        Arc::new(DirectoryImageSink::new(dir.clone(), base))
    };

    match cli.sink {
        SinkArg::Memory => Ok(Arc::new(MemoryImageSink::default())),
        SinkArg::Azure => {
            let conn = cli
                .azure_connection_string
                .as_deref()
                .context("--sink azure needs --azure-connection-string or AZURE_STORAGE_CONNECTION_STRING")?;
            Ok(sink::azure_from_connection_string(conn, &cli.container)?)
        }
        SinkArg::Dir => {
            let dir = cli
                .image_dir
                .as_ref()
                .context("--sink dir needs --image-dir or DOCX2MD_IMAGE_DIR")?;
            Ok(dir_sink(dir))
        }
        SinkArg::Auto => {
            if let Some(conn) = cli.azure_connection_string.as_deref() {
                Ok(sink::azure_from_connection_string(conn, &cli.container)?)
            } else if let Some(dir) = cli.image_dir.as_ref() {
                Ok(dir_sink(dir))
            } else {
                anyhow::bail!(
                    "No image sink configured.\n\
                     Set AZURE_STORAGE_CONNECTION_STRING, pass --image-dir, or use --sink memory."
                )
            }
        }
    }
}
