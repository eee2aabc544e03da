use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use spacify_contracts::api::{ApiResponse, VisualizationRequest};
use spacify_contracts::catalog::{CatalogFilter, FurnitureCatalog};
use spacify_engine::storage::mime_for_path;
use spacify_engine::{Spacify, SpacifyConfig, SpacifyError, UploadedFile};

#[derive(Debug, Parser)]
#[command(name = "spacify", version, about = "Room styling and furniture visualization")]
struct Cli {
    /// Directory for room photos and rendered visualizations.
    #[arg(long, global = true)]
    uploads: Option<PathBuf>,
    /// Directory for project manifests and receipts.
    #[arg(long, global = true)]
    data: Option<PathBuf>,
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// Root the catalog's image references resolve against.
    #[arg(long, global = true)]
    furniture_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Upload(UploadArgs),
    Visualize(VisualizeArgs),
    Catalog(CatalogArgs),
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    Health,
}

#[derive(Debug, Parser)]
struct UploadArgs {
    #[arg(long)]
    file: PathBuf,
    /// Declared MIME type; guessed from the extension when omitted.
    #[arg(long)]
    mime: Option<String>,
    #[arg(long)]
    project: Option<String>,
}

#[derive(Debug, Parser)]
struct VisualizeArgs {
    /// Stored room image id as returned by `upload`.
    #[arg(long)]
    room: Option<String>,
    #[arg(long)]
    style: Option<String>,
    /// Catalog furniture id; repeat or comma-separate for several.
    #[arg(long = "furniture", value_delimiter = ',')]
    furniture: Vec<String>,
    /// JSON request body (`roomImageId`, `styleDescription`, `furnitureItems`).
    #[arg(long)]
    request: Option<PathBuf>,
    #[arg(long)]
    project: Option<String>,
    /// Skip the generative call and render the grid composite.
    #[arg(long)]
    offline: bool,
}

#[derive(Debug, Parser)]
struct CatalogArgs {
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    search: Option<String>,
    /// List categories with item counts instead of items.
    #[arg(long)]
    categories: bool,
}

#[derive(Debug, Subcommand)]
enum ProjectCommand {
    Create(ProjectCreateArgs),
    Show(ProjectShowArgs),
    List,
}

#[derive(Debug, Parser)]
struct ProjectCreateArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    style: String,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Debug, Parser)]
struct ProjectShowArgs {
    #[arg(long)]
    id: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("spacify error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = SpacifyConfig::from_env()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(cli, config, &mut out)
}

fn execute(cli: Cli, mut config: SpacifyConfig, out: &mut dyn Write) -> Result<i32> {
    if let Some(dir) = cli.uploads {
        config.uploads_dir = dir;
    }
    if let Some(dir) = cli.data {
        config.data_dir = dir;
    }
    if let Some(path) = cli.events {
        config.events_path = path;
    }
    if let Some(root) = cli.furniture_root {
        config.furniture_root = root;
    }
    if let Command::Visualize(args) = &cli.command {
        if args.offline {
            config.gemini.api_key = None;
        }
    }
    let spacify = Spacify::from_config(config)?;

    match cli.command {
        Command::Upload(args) => respond(
            out,
            "Room image uploaded successfully",
            upload(&spacify, &args),
        ),
        Command::Visualize(args) => respond(
            out,
            "Furnished room image generated successfully",
            visualization_request(spacify.catalog(), &args).and_then(|request| {
                spacify
                    .visualize(&request, args.project.as_deref())
                    .map(|result| result.data)
            }),
        ),
        Command::Catalog(args) if args.categories => respond(
            out,
            "Categories retrieved successfully",
            Ok(spacify.catalog().categories()),
        ),
        Command::Catalog(args) => {
            let filter = CatalogFilter {
                category: args.category,
                search: args.search,
            };
            respond(
                out,
                "Furniture retrieved successfully",
                Ok(spacify.catalog().list(&filter)),
            )
        }
        Command::Project { command } => match command {
            ProjectCommand::Create(args) => respond(
                out,
                "Project created successfully",
                spacify.create_project(&args.name, &args.style, args.description),
            ),
            ProjectCommand::Show(args) => respond(
                out,
                "Project retrieved successfully",
                spacify.load_project(&args.id),
            ),
            ProjectCommand::List => respond(
                out,
                "Projects retrieved successfully",
                spacify.list_projects(),
            ),
        },
        Command::Health => respond(out, "Service is running", Ok(spacify.health())),
    }
}

fn upload(spacify: &Spacify, args: &UploadArgs) -> Result<spacify_contracts::api::UploadData> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let mime_type = args
        .mime
        .clone()
        .or_else(|| mime_for_path(&args.file).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let upload = UploadedFile {
        original_name: file_name(&args.file),
        mime_type,
        bytes,
    };
    let room = spacify.upload_room_image(&upload, args.project.as_deref())?;
    Ok(room.upload_data())
}

/// Builds the request from an optional JSON body, then applies the flags
/// on top. `--furniture` ids replace any items from the body.
fn visualization_request(
    catalog: &FurnitureCatalog,
    args: &VisualizeArgs,
) -> Result<VisualizationRequest> {
    let mut request = match args.request.as_deref() {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<VisualizationRequest>(&raw).map_err(|err| {
                SpacifyError::input(format!("Invalid visualization request: {err}"))
            })?
        }
        None => VisualizationRequest {
            room_image_id: None,
            style_description: String::new(),
            furniture_items: Vec::new(),
        },
    };
    if let Some(room) = args.room.as_deref() {
        request.room_image_id = Some(room.to_string());
    }
    if let Some(style) = args.style.as_deref() {
        request.style_description = style.to_string();
    }
    if !args.furniture.is_empty() {
        let mut items = Vec::with_capacity(args.furniture.len());
        for id in args.furniture.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
            let item = catalog
                .get(id)
                .ok_or_else(|| SpacifyError::input(format!("Unknown furniture item '{id}'")))?;
            items.push(item.selection());
        }
        request.furniture_items = items;
    }
    Ok(request)
}

fn respond<T: Serialize>(out: &mut dyn Write, message: &str, result: Result<T>) -> Result<i32> {
    let response = match result {
        Ok(data) => ApiResponse::success(message, data),
        Err(err) => {
            let err = SpacifyError::from_anyhow(err);
            ApiResponse::failure(err.kind, err.message)
        }
    };
    writeln!(out, "{}", serde_json::to_string_pretty(&response)?)?;
    Ok(if response.is_success() { 0 } else { 1 })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}
