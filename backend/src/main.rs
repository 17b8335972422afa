use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

mod api;
mod config;
mod context;
mod guide;
mod pdf_export;
mod pdf_metrics;


use config::Config;
use context::AppContext;
use guide::RenderRequest;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory with the front-end files
        #[arg(long)]
        static_dir: Option<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Fill the guide from a JSON file of field values
    Render {
        /// JSON object mapping field names to values
        #[arg(short, long)]
        input: PathBuf,
        /// Where to write the filled PDF
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// List the known layout versions
    Layouts {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Settings shared by every subcommand.
#[derive(Args)]
struct Overrides {
    /// Base PDF template
    #[arg(long)]
    template: Option<PathBuf>,
    /// Directory of extra layout tables
    #[arg(long)]
    layouts_dir: Option<PathBuf>,
    /// Layout version to use when a request doesn't name one
    #[arg(long)]
    layout: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(template) = self.template {
            config.template = template;
        }
        if let Some(dir) = self.layouts_dir {
            config.layouts_dir = Some(dir);
        }
        if let Some(layout) = self.layout {
            config.default_layout = layout;
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()).await {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Serve {
            host,
            port,
            static_dir,
            overrides,
        }) => {
            overrides.apply(&mut config);
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if static_dir.is_some() {
                config.static_dir = static_dir;
            }
            serve(config).await
        }
        Some(Commands::Render {
            input,
            output,
            overrides,
        }) => {
            overrides.apply(&mut config);
            render(config, &input, &output)
        }
        Some(Commands::Layouts { overrides }) => {
            overrides.apply(&mut config);
            let layouts = context::load_layouts(&config)?;
            for layout in layouts.layouts() {
                let marker = if layout.version == layouts.default_version() {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {:<20} {:>3} fields  {}",
                    marker,
                    layout.version,
                    layout.field_names().len(),
                    layout.description
                );
            }
            Ok(())
        }
        None => serve(config).await,
    }
}

fn render(config: Config, input: &std::path::Path, output: &std::path::Path) -> Result<()> {
    let ctx = AppContext::load(config)?;
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", input.display()))?;
    let request = RenderRequest::from_json(&json)
        .ok_or_else(|| anyhow!("{} holds no field values", input.display()))?;
    let layout = ctx
        .layouts
        .resolve(None)
        .ok_or_else(|| anyhow!("No default layout"))?;

    let pdf = pdf_export::fill_guide(&ctx.template, &request, &layout)?;
    std::fs::write(output, &pdf).with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!(
        "Wrote {} ({} bytes, layout {})",
        output.display(),
        pdf.len(),
        layout.version
    );
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let listener = config.listen().await?;
    let ctx = Arc::new(AppContext::load(config)?);
    let app = api::router(ctx);

    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
