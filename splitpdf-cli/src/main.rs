use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use splitpdf_core::{fingerprint_for_doc_id, Manifest, ManifestSource};
use splitpdf_http::{build_client, check_pages, HttpManifestSource};
use splitpdf_viewer::ViewerConfig;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Parser)]
#[command(
    name = "splitpdf",
    version,
    about = "Inspect documents served as one PDF file per page"
)]
struct Args {
    /// TOML config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level on the console
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch and validate a manifest, then summarize it
    Inspect {
        manifest_url: String,
        /// Print the manifest as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Check that every page file of a manifest is reachable
    Check {
        manifest_url: String,
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "splitpdf", "splitpdf")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs, args.verbose)?;
    let config = resolve_config(args.config.as_deref(), project_dirs.config_dir())?;
    debug!(?config, "configuration resolved");

    let client = build_client()?;
    let manifests = HttpManifestSource::new(client.clone());

    match args.command {
        Command::Inspect { manifest_url, json } => {
            let manifest = manifests
                .fetch(&manifest_url)
                .await
                .with_context(|| format!("failed to load {manifest_url}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&manifest)?);
            } else {
                print!("{}", summarize(&manifest));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check {
            manifest_url,
            concurrency,
        } => {
            let manifest = manifests
                .fetch(&manifest_url)
                .await
                .with_context(|| format!("failed to load {manifest_url}"))?;
            info!(pages = manifest.page_count, concurrency, "checking page files");
            let checks = check_pages(&client, &manifest, &config.loading, concurrency).await?;

            let mut unreachable = 0;
            for check in &checks {
                if let Err(err) = &check.outcome {
                    unreachable += 1;
                    warn!(page = check.page, %err, "page unreachable");
                    println!("page {:>4}  FAIL  {}", check.page, err);
                }
            }
            println!(
                "{} of {} pages reachable",
                checks.len() - unreachable,
                manifest.page_count
            );
            Ok(if unreachable == 0 && checks.len() == manifest.page_count {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn summarize(manifest: &Manifest) -> String {
    let mut text = String::new();
    text.push_str(&format!("doc id:      {}\n", manifest.doc_id));
    text.push_str(&format!(
        "fingerprint: {}\n",
        fingerprint_for_doc_id(&manifest.doc_id)
    ));
    text.push_str(&format!("filename:    {}\n", manifest.filename));
    text.push_str(&format!("pages:       {}\n", manifest.page_count));
    if let Some(created_at) = &manifest.created_at {
        text.push_str(&format!("created at:  {created_at}\n"));
    }
    if let (Some(first), Some(last)) = (manifest.pages.first(), manifest.pages.last()) {
        text.push_str(&format!("first page:  {}\n", first.pdf_url));
        text.push_str(&format!("last page:   {}\n", last.pdf_url));
    }
    text
}

/// Explicit path first, then `config.toml` in `config_dir`, then defaults.
fn resolve_config(explicit: Option<&Path>, config_dir: &Path) -> Result<ViewerConfig> {
    if let Some(path) = explicit {
        return ViewerConfig::load(path).with_context(|| format!("invalid config {:?}", path));
    }
    let fallback = config_dir.join("config.toml");
    if fallback.is_file() {
        return ViewerConfig::load(&fallback)
            .with_context(|| format!("invalid config {:?}", fallback));
    }
    Ok(ViewerConfig::default())
}

fn init_logging(project_dirs: &ProjectDirs, verbose: bool) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "splitpdf.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitpdf_core::PageEntry;
    use splitpdf_viewer::{ScalePreset, ScaleValue};

    #[test]
    fn check_accepts_concurrency_and_global_flags() {
        let args = Args::try_parse_from([
            "splitpdf",
            "check",
            "https://docs.test/m.json",
            "--concurrency",
            "3",
            "--verbose",
        ])
        .unwrap();
        assert!(args.verbose);
        match args.command {
            Command::Check {
                manifest_url,
                concurrency,
            } => {
                assert_eq!(manifest_url, "https://docs.test/m.json");
                assert_eq!(concurrency, 3);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn inspect_requires_a_manifest_url() {
        assert!(Args::try_parse_from(["splitpdf", "inspect"]).is_err());
        let args = Args::try_parse_from(["splitpdf", "--config", "a.toml", "inspect", "u"]).unwrap();
        assert_eq!(args.config.as_deref(), Some(Path::new("a.toml")));
    }

    #[test]
    fn config_prefers_explicit_path_then_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_config(None, dir.path()).unwrap(),
            ViewerConfig::default()
        );

        fs::write(dir.path().join("config.toml"), "default-scale = \"page-fit\"\n").unwrap();
        assert_eq!(
            resolve_config(None, dir.path()).unwrap().default_scale,
            ScaleValue::Preset(ScalePreset::PageFit)
        );

        let explicit = dir.path().join("other.toml");
        fs::write(&explicit, "default-scale = \"2\"\n").unwrap();
        assert_eq!(
            resolve_config(Some(&explicit), dir.path()).unwrap().default_scale,
            ScaleValue::Numeric(2.0)
        );

        fs::write(&explicit, "default-scale = [").unwrap();
        assert!(resolve_config(Some(&explicit), dir.path()).is_err());
    }

    #[test]
    fn summary_lists_first_and_last_page() {
        let manifest = Manifest {
            doc_id: "d1".to_owned(),
            filename: "deck.pdf".to_owned(),
            page_count: 2,
            created_at: None,
            pages: vec![
                PageEntry {
                    n: 1,
                    pdf_url: "https://p.test/1.pdf".to_owned(),
                },
                PageEntry {
                    n: 2,
                    pdf_url: "https://p.test/2.pdf".to_owned(),
                },
            ],
        };
        let summary = summarize(&manifest);
        assert!(summary.contains("deck.pdf"));
        assert!(summary.contains("first page:  https://p.test/1.pdf"));
        assert!(summary.contains("last page:   https://p.test/2.pdf"));
        assert!(!summary.contains("created at"));
    }
}
