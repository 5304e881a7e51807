use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use reclaimer::clms::catalog::{self, ITEMS_OPTION};
use reclaimer::clms::task::{DEFAULT_COORDINATE_SYSTEM, DEFAULT_FORMAT};
use reclaimer::clms::{self, Credential, DataRequest, Index, Output, TaskHandle, TaskOrchestrator};
use reclaimer::config::Settings;
use reclaimer::{http, zenodo};
use reqwest::Client;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "reclaimer", version, about = "Fetch datasets from CLMS and Zenodo")]
pub struct Cli {
    /// TOML settings file overriding endpoints and the poll interval
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug detail
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copernicus Land Monitoring Service
    #[command(subcommand)]
    Clms(ClmsCommand),
    /// Zenodo records
    Zenodo(ZenodoArgs),
}

#[derive(Subcommand, Debug)]
pub enum ClmsCommand {
    /// List datasets, or describe one by UID
    Search(SearchArgs),
    /// Request a dataset and download it once ready
    Download(DownloadArgs),
    /// List requests made with this API key
    Requests(ApiKeyArgs),
    /// Finish a request made earlier
    Resume(ResumeArgs),
}

#[derive(Args, Debug)]
pub struct ApiKeyArgs {
    /// JSON API key downloaded from the CLMS account page
    #[arg(long = "apikeyfile")]
    pub api_key_file: PathBuf,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Extract the download if it is a zip archive
    #[arg(long)]
    pub extract: bool,

    /// Destination: file name for a single item, directory for several
    #[arg(long, default_value = "")]
    pub output: String,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search prepackaged data
    #[arg(long)]
    pub prepackaged: bool,

    /// UID of the dataset
    #[arg(long)]
    pub uid: Option<String>,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Request prepackaged data
    #[arg(long)]
    pub prepackaged: bool,

    /// UID of the dataset
    #[arg(long)]
    pub uid: String,

    /// ID of the item within the dataset to fetch
    #[arg(long = "download-id")]
    pub download_id: String,

    #[command(flatten)]
    pub api_key: ApiKeyArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Requested download format
    #[arg(long, default_value = DEFAULT_FORMAT)]
    pub format: String,

    /// Coordinate system to use
    #[arg(long = "cgs", default_value = DEFAULT_COORDINATE_SYSTEM)]
    pub coordinate_system: String,
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    #[command(flatten)]
    pub api_key: ApiKeyArgs,

    /// Request ID returned by an earlier download
    #[arg(long)]
    pub request: String,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct ZenodoArgs {
    /// Zenodo record ID
    #[arg(long = "zenodo-id")]
    pub zenodo_id: String,

    /// File within the record to download; without it the record is described
    #[arg(long)]
    pub filename: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    let client = http::client(&settings.http.user_agent)?;
    let cwd = std::env::current_dir().context("failed to look up cwd")?;

    match cli.command {
        Command::Clms(command) => run_clms(command, &settings, &client, &cwd).await,
        Command::Zenodo(args) => run_zenodo(args, &settings, &client, &cwd).await,
    }
}

async fn run_clms(command: ClmsCommand, settings: &Settings, client: &Client, cwd: &Path) -> Result<()> {
    let api_url = settings.clms.api_url.as_str();

    match command {
        ClmsCommand::Search(args) => {
            let index = if args.prepackaged {
                Index::Prepackaged
            } else {
                Index::Generated
            };
            let items = catalog::fetch_index(client, api_url, index).await?;
            match args.uid {
                None => {
                    for item in &items {
                        println!("{}: {} ({} items)", item.uid, item.title, item.download_count());
                    }
                }
                Some(uid) => print_item(catalog::find_item(&items, &uid)?, index),
            }
            Ok(())
        }
        ClmsCommand::Download(args) => {
            if args.prepackaged
                && (args.format != DEFAULT_FORMAT || args.coordinate_system != DEFAULT_COORDINATE_SYSTEM)
            {
                bail!("can not specify format or coordinate system for prepackaged CLMS data");
            }
            let request = if args.prepackaged {
                DataRequest::prepackaged(&args.uid, &args.download_id)
            } else {
                DataRequest::generated(&args.uid, &args.download_id, &args.format, &args.coordinate_system)
            };

            let token = session(client, &args.api_key).await?;
            let orchestrator = TaskOrchestrator::new(client, api_url, &token)
                .with_poll_interval(settings.clms.poll_interval());
            let placed = clms::fetch_data(client, &orchestrator, &request, output(&args.output, cwd)).await?;
            report(&placed);
            Ok(())
        }
        ClmsCommand::Requests(args) => {
            let token = session(client, &args).await?;
            let orchestrator = TaskOrchestrator::new(client, api_url, &token);
            let statuses = orchestrator
                .list_requests()
                .await
                .context("failed to get requests")?;
            println!("{}", serde_json::to_string(&statuses)?);

            let mut rows = Vec::new();
            for (task_id, status) in &statuses {
                for dataset in &status.datasets {
                    rows.push([task_id.clone(), dataset.dataset_id.clone(), status.status.clone()]);
                }
            }
            print_table(["Request ID", "Dataset ID", "Status"], &rows);
            Ok(())
        }
        ClmsCommand::Resume(args) => {
            if args.request.is_empty() {
                bail!("request ID required");
            }
            let token = session(client, &args.api_key).await?;
            let orchestrator = TaskOrchestrator::new(client, api_url, &token)
                .with_poll_interval(settings.clms.poll_interval());
            let placed = clms::complete_download(
                client,
                &orchestrator,
                &TaskHandle::new(args.request),
                output(&args.output, cwd),
            )
            .await?;
            report(&placed);
            Ok(())
        }
    }
}

async fn run_zenodo(args: ZenodoArgs, settings: &Settings, client: &Client, cwd: &Path) -> Result<()> {
    let api_url = settings.zenodo.api_url.as_str();
    if args.zenodo_id.is_empty() {
        bail!("Zenodo ID is required");
    }

    match args.filename {
        Some(filename) => {
            let placed = zenodo::fetch_data(
                client,
                api_url,
                &args.zenodo_id,
                &filename,
                args.output.extract,
                &args.output.output,
                cwd,
            )
            .await
            .context("failed to fetch zenodo data")?;
            report(&placed);
        }
        None => {
            let record = zenodo::fetch_record(client, api_url, &args.zenodo_id)
                .await
                .context("failed to look up zenodo record")?;
            print_record(&record);
        }
    }
    Ok(())
}

async fn session(client: &Client, args: &ApiKeyArgs) -> Result<clms::SessionToken> {
    let credential = Credential::read(&args.api_key_file).context("failed to load api key")?;
    let token = credential
        .issue_session(client)
        .await
        .context("failed to get session token")?;
    Ok(token)
}

fn output<'a>(args: &'a OutputArgs, cwd: &'a Path) -> Output<'a> {
    Output {
        extract: args.extract,
        destination: &args.output,
        cwd,
    }
}

fn report(placed: &[PathBuf]) {
    for path in placed {
        println!("{}", path.display());
    }
}

fn print_item(item: &clms::CatalogItem, index: Index) {
    println!("title: {}", item.title);
    println!("description: {}", item.description);
    for descriptor in item.downloads.get(ITEMS_OPTION).into_iter().flatten() {
        match index {
            Index::Generated => println!("\t{}: {}", descriptor.id, descriptor.path),
            Index::Prepackaged => {
                println!("\t{}: {} ({})", descriptor.id, descriptor.name, descriptor.size)
            }
        }
    }
}

fn print_record(record: &zenodo::Record) {
    println!("title: {}", record.title);
    println!("creators:");
    for creator in &record.metadata.creators {
        println!(
            "\t{}, {}",
            creator.name,
            creator.affiliation.as_deref().unwrap_or_default()
        );
    }
    if !record.metadata.license.is_empty() {
        println!("license:");
        for (key, value) in &record.metadata.license {
            println!("\t{key}: {value}");
        }
    }
    println!("files:");
    for file in &record.files {
        println!("\t{} ({})", file.key, zenodo::human_size(file.size));
    }
}

fn print_table<const N: usize>(headers: [&str; N], rows: &[[String; N]]) {
    let mut widths = headers.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    let rule = widths.map(|width| "-".repeat(width));
    println!("{}", table_line(&headers, &widths));
    println!("{}", table_line(&rule.each_ref().map(String::as_str), &widths));
    for row in rows {
        println!("{}", table_line(&row.each_ref().map(String::as_str), &widths));
    }
}

fn table_line(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}
