use clap::{Parser, Subcommand};
use sitekiln::config::{self, SiteConfig};
use sitekiln::engine::{Engine, EngineBuilder};
use sitekiln::imaging::RustBackend;
use sitekiln::{generate, output, server, watch};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sitekiln")]
#[command(about = "Build, serve and generate a content tree")]
#[command(long_about = "\
Build, serve and generate a content tree

Every file under the content root is either a static asset (copied, or
resized into variants) or a content item (front matter + markdown or HTML)
that gets formatted, routed and rendered.

  content/
  ├── index.md                 # → /
  ├── about.md                 # → /about/
  ├── blog/
  │   └── first-post.md        # → /blog/first-post/
  ├── landing.html             # → /landing.html
  └── img/
      └── photo.jpg            # → dist/img/photo.jpg (+ variants)

Front matter is an optional TOML block fenced by +++ lines:

  +++
  title = \"First post\"
  draft = true
  +++

Run 'sitekiln gen-config' to print a documented sitekiln.toml.")]
#[command(version)]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Content directory (overrides content_root)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Output directory (overrides build_root)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Include items marked as drafts
    #[arg(long, global = true)]
    drafts: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the content tree and render pages on request
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Write every page to the output directory
    Generate,
    /// Scan, process and route without writing pages
    Check {
        /// Print the report and route table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock sitekiln.toml with all options documented
    GenConfig,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if matches!(cli.command, Command::GenConfig) {
        print!("{}", config::stock_config_toml());
        return Ok(ExitCode::SUCCESS);
    }

    let site_config = load_site_config(&cli)?;
    init_thread_pool(&site_config.processing);
    let engine = EngineBuilder::from_config(&site_config, Arc::new(RustBackend::new()))?.build();

    match cli.command {
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| site_config.server.host.clone());
            let port = port.unwrap_or(site_config.server.port);
            serve(Arc::new(engine), &host, port)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Generate => {
            let prepared = engine.prepare()?;
            output::print_prepare_report(&prepared);
            let report = generate::generate(&engine);
            output::print_generate_report(&report, &engine.settings().build_root);
            if prepared.is_clean() && report.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Check { json } => {
            let report = engine.prepare()?;
            let routes = engine.routes().snapshot();
            if json {
                let value = serde_json::json!({ "report": report, "routes": routes });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                output::print_prepare_report(&report);
                output::print_routes(&routes);
            }
            if report.is_clean() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::GenConfig => Ok(ExitCode::SUCCESS),
    }
}

/// Config file, then CLI flags on top.
fn load_site_config(cli: &Cli) -> Result<SiteConfig, config::ConfigError> {
    let mut site_config = config::load_config(&cli.config)?;
    if let Some(source) = &cli.source {
        site_config.content_root = source.to_string_lossy().into_owned();
    }
    if let Some(output) = &cli.output {
        site_config.build_root = output.to_string_lossy().into_owned();
    }
    if cli.drafts {
        site_config.include_drafts = true;
    }
    Ok(site_config)
}

/// Prepare, start the watcher, and serve until ctrl-c.
fn serve(engine: Arc<Engine>, host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let report = engine.prepare()?;
    output::print_prepare_report(&report);

    let watcher = watch::spawn(engine.clone())?;
    let runtime = tokio::runtime::Runtime::new()?;
    let served = runtime.block_on(server::run(engine, host, port));
    watcher.stop()?;
    served?;
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
