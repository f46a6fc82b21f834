//! # Field Survey CLI (`survey`)
//!
//! Command-line front end for the survey client core. It runs the same
//! pipeline the mobile app does: tasks and completion from the backend,
//! photos watermarked locally, records submitted with their evidence.
//!
//! ## Usage
//!
//! ```bash
//! survey --config ./config/survey.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `survey login` | Log in and save the session token |
//! | `survey tasks` | List a day's tasks with completion |
//! | `survey task <id>` | Show one task's items and counts |
//! | `survey watermark <image>` | Stamp a single image |
//! | `survey submit ...` | Capture photos and submit a record |
//! | `survey records` | List submitted records |
//! | `survey edit-record <id>` | Edit a record created today |
//! | `survey delete-record <id>` | Delete a record created today |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use field_survey::capture::{existing_photos, FileCamera, PhotoCapturePipeline};
use field_survey::client::HttpApi;
use field_survey::config::{self, Config};
use field_survey::geo::{FixedLocation, GeoLocator};
use field_survey::models::{Coordinates, DraftRecord, SurveyorId, TaskId};
use field_survey::progress::ProgressMode;
use field_survey::reconcile::{self, ReconciledTask, TaskDashboard};
use field_survey::records::{self, RecordEdit};
use field_survey::session::SessionContext;
use field_survey::submit::SurveyRecordSubmitter;
use field_survey::traits::{RecordSink, TaskSource};
use field_survey::uploader::EvidenceUploader;
use field_survey::watermark::{
    format_timestamp, watermark_lines, BitmapWatermark, DisabledWatermark, WatermarkRenderer,
    WatermarkStamp,
};

/// Field survey client.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/survey.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "survey", about = "Field price survey client", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/survey.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session in `session.token_file`.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// List tasks for a date (default today) with completion.
    Tasks {
        /// Date as YYYY-MM-DD.
        #[arg(long)]
        date: Option<String>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show a task's items and this surveyor's record counts.
    Task {
        id: TaskId,

        #[arg(long)]
        json: bool,
    },

    /// Watermark one image with the current time and a location label.
    Watermark {
        image: PathBuf,

        /// Location text for the second line.
        #[arg(long)]
        label: Option<String>,

        /// Output path. Defaults to `<capture.output_dir>/<stem>_wm.jpg`.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Watermark the given photos and submit them as one record.
    Submit {
        #[arg(long)]
        task: TaskId,

        #[arg(long)]
        item: i64,

        #[arg(long)]
        store: String,

        #[arg(long)]
        price: String,

        #[arg(long)]
        address: Option<String>,

        #[arg(long)]
        promotion: Option<String>,

        #[arg(long)]
        remark: Option<String>,

        /// Treat the photos as gallery picks instead of camera shots.
        #[arg(long)]
        gallery: bool,

        /// Progress output: `human`, `json`, or `off`. Defaults to human on a TTY.
        #[arg(long)]
        progress: Option<String>,

        /// Photo files.
        photos: Vec<PathBuf>,
    },

    /// List submitted records.
    Records {
        /// Only records created on this date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,
    },

    /// Edit a record created today. Omitted fields are left unchanged.
    EditRecord {
        id: i64,

        #[arg(long)]
        store: Option<String>,

        #[arg(long)]
        address: Option<String>,

        #[arg(long)]
        price: Option<String>,

        #[arg(long)]
        promotion: Option<String>,

        #[arg(long)]
        remark: Option<String>,
    },

    /// Delete a record created today.
    DeleteRecord { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let cfg = config::load_config(&cli.config)?;
    let session = Arc::new(SessionContext::from_config(&cfg.session)?);

    match cli.command {
        Commands::Login { username, password } => {
            let grant = HttpApi::login(&cfg.api, &username, &password).await?;
            let Some(token) = grant.token else {
                bail!("login succeeded but the server issued no token");
            };
            session.log_in(token, grant.surveyor_id, grant.name.clone())?;
            println!(
                "Logged in as {} (surveyor {}).",
                grant.name.as_deref().unwrap_or(&username),
                grant.surveyor_id
            );
        }
        Commands::Tasks { date, json } => {
            let api = HttpApi::new(&cfg.api, session.clone())?;
            let surveyor_id = require_surveyor(&session)?;
            let date = parse_date(date.as_deref())?.unwrap_or_else(records::today);
            let tasks = api.fetch_tasks_for_date(date).await?;
            let reconciled = reconcile::reconcile_all(&tasks, &api, surveyor_id).await;
            let board = TaskDashboard::summarize(&reconciled);
            if json {
                let out = serde_json::json!({ "tasks": reconciled, "dashboard": board });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_tasks(date, &reconciled, &board);
            }
        }
        Commands::Task { id, json } => {
            let api = HttpApi::new(&cfg.api, session.clone())?;
            let surveyor_id = require_surveyor(&session)?;
            let task = api.fetch_task(id).await?;
            let reconciled = reconcile::reconcile(&task, &api, surveyor_id).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&reconciled)?);
            } else {
                print_task(&reconciled);
            }
        }
        Commands::Watermark { image, label, out } => {
            let stamp = WatermarkStamp {
                timestamp: format_timestamp(&Local::now(), &cfg.watermark.timestamp_format),
                location_label: label,
                coordinates: cfg.location.fixed_coordinates(),
            };
            let out = out.unwrap_or_else(|| {
                let stem = image
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "photo".to_string());
                cfg.capture.output_dir.join(format!("{stem}_wm.jpg"))
            });
            BitmapWatermark::from_config(&cfg.watermark).render(&image, &out, &stamp)?;
            for line in watermark_lines(&stamp) {
                println!("  {}", line);
            }
            println!("Wrote {}", out.display());
        }
        Commands::Submit {
            task,
            item,
            store,
            price,
            address,
            promotion,
            remark,
            gallery,
            progress,
            photos,
        } => {
            let api = Arc::new(HttpApi::new(&cfg.api, session.clone())?);
            let surveyor_id = require_surveyor(&session)?;
            let mode = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some("human") => ProgressMode::Human,
                Some("json") => ProgressMode::Json,
                Some("off") => ProgressMode::Off,
                Some(other) => bail!("unknown progress mode '{}'", other),
            };
            let request = SubmitRequest {
                task,
                item,
                store,
                price,
                address: address.unwrap_or_default(),
                promotion: promotion.unwrap_or_default(),
                remark: remark.unwrap_or_default(),
                gallery,
                photos,
            };
            run_submit(&cfg, api, surveyor_id, request, mode).await?;
        }
        Commands::Records { date } => {
            let api = HttpApi::new(&cfg.api, session.clone())?;
            let surveyor_id = require_surveyor(&session)?;
            let date = parse_date(date.as_deref())?;
            let views = records::list_records(&api, surveyor_id, date, records::today()).await?;
            if views.is_empty() {
                println!("No records.");
            }
            for view in views {
                let r = &view.record;
                println!(
                    "{:>6}  {}  {:<20} {:<20} {:>8.2}  {}",
                    r.id,
                    r.created_at.format("%Y-%m-%d %H:%M"),
                    r.product_name.as_deref().unwrap_or("-"),
                    r.store_name,
                    r.price,
                    if view.can_edit { "editable" } else { "locked" }
                );
            }
        }
        Commands::EditRecord {
            id,
            store,
            address,
            price,
            promotion,
            remark,
        } => {
            let api = HttpApi::new(&cfg.api, session.clone())?;
            let surveyor_id = require_surveyor(&session)?;
            let record = records::find_record(&api, surveyor_id, id)
                .await?
                .with_context(|| format!("record {} not found", id))?;
            let edit = RecordEdit {
                store_name: store.unwrap_or_default(),
                store_address: address.unwrap_or_default(),
                price: price.unwrap_or_default(),
                promotion_info: promotion.unwrap_or_default(),
                remark: remark.unwrap_or_default(),
                coordinates: None,
            };
            if records::update_record(&api, &record, &edit, records::today()).await? {
                println!("Updated record {}.", id);
            } else {
                println!("Nothing to change.");
            }
        }
        Commands::DeleteRecord { id } => {
            let api = HttpApi::new(&cfg.api, session.clone())?;
            let surveyor_id = require_surveyor(&session)?;
            let record = records::find_record(&api, surveyor_id, id)
                .await?
                .with_context(|| format!("record {} not found", id))?;
            records::delete_record(&api, &record, records::today()).await?;
            println!("Deleted record {}.", id);
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn require_surveyor(session: &SessionContext) -> Result<SurveyorId> {
    session
        .surveyor_id()
        .context("no surveyor id; run `survey login` or set session.surveyor_id")
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", s))
    })
    .transpose()
}

struct SubmitRequest {
    task: TaskId,
    item: i64,
    store: String,
    price: String,
    address: String,
    promotion: String,
    remark: String,
    gallery: bool,
    photos: Vec<PathBuf>,
}

async fn run_submit(
    cfg: &Config,
    api: Arc<HttpApi>,
    surveyor_id: SurveyorId,
    request: SubmitRequest,
    mode: ProgressMode,
) -> Result<()> {
    let task = api.fetch_task(request.task).await?;
    let item = task
        .items
        .iter()
        .find(|i| i.id == request.item)
        .cloned()
        .with_context(|| format!("task {} has no item {}", task.id, request.item))?;

    let coordinates: Option<Coordinates> = cfg.location.fixed_coordinates();
    let locator = GeoLocator::from_config(Arc::new(FixedLocation::new(coordinates)), &cfg.location);
    let renderer: Arc<dyn WatermarkRenderer> = if cfg.watermark.enabled {
        Arc::new(BitmapWatermark::from_config(&cfg.watermark))
    } else {
        Arc::new(DisabledWatermark)
    };
    let paths = existing_photos(&request.photos);
    let camera = if request.gallery {
        FileCamera::new(Vec::new()).with_gallery(paths.clone())
    } else {
        FileCamera::new(paths.clone())
    };
    let mut pipeline = PhotoCapturePipeline::new(
        Arc::new(camera),
        locator,
        renderer,
        cfg.capture.output_dir.clone(),
    )
    .with_timestamp_format(cfg.watermark.timestamp_format.clone());

    let label = (!request.address.trim().is_empty()).then_some(request.address.as_str());
    if request.gallery {
        if let Err(e) = pipeline.import_from_gallery(coordinates, label).await {
            tracing::warn!(error = %e, "gallery import failed");
        }
    } else {
        for _ in &paths {
            if let Err(e) = pipeline.capture(coordinates, label).await {
                tracing::warn!(error = %e, "photo skipped");
            }
        }
    }

    let mut draft = DraftRecord {
        task_id: Some(task.id),
        selected_item: Some(item),
        store_name: request.store,
        store_address: request.address,
        price: request.price,
        promotion_info: request.promotion,
        remark: request.remark,
        coordinates,
        photos: pipeline.take_photos(),
    };

    let records: Arc<dyn RecordSink> = api.clone();
    let submitter =
        SurveyRecordSubmitter::new(records, EvidenceUploader::new(api.clone()), surveyor_id)
            .with_reporter(mode.reporter());
    let receipt = submitter.submit(&mut draft).await?;
    println!(
        "Saved record {} with {} photo(s){}.",
        receipt.record_id,
        receipt.photo_urls.len(),
        if receipt.dropped_photos > 0 {
            format!(", {} dropped", receipt.dropped_photos)
        } else {
            String::new()
        }
    );

    let refreshed = reconcile::reconcile(&task, &*api, surveyor_id).await;
    print_task(&refreshed);
    Ok(())
}

fn print_tasks(date: NaiveDate, tasks: &[ReconciledTask], board: &TaskDashboard) {
    println!("Tasks for {}", date);
    if tasks.is_empty() {
        println!("  (none)");
    }
    for task in tasks {
        println!(
            "{:>5}  {:<32} {:<10} {:>3}%  {}/{} items, {} records{}",
            task.id,
            task.title,
            format!("{:?}", task.status).to_lowercase(),
            task.completion_percent,
            task.completed_item_count,
            task.items.len(),
            task.total_record_count,
            if task.warning.is_some() { "  (progress unavailable)" } else { "" }
        );
    }
    println!(
        "\n{} task(s), {}/{} items done ({}%), {} records",
        board.total_tasks,
        board.completed_items,
        board.total_items,
        board.completion_percent,
        board.total_records
    );
}

fn print_task(task: &ReconciledTask) {
    println!(
        "Task {}: {} ({}), {}% complete",
        task.id, task.title, task.date, task.completion_percent
    );
    if let Some(warning) = &task.warning {
        println!("  warning: {}", warning);
    }
    for item in &task.items {
        println!(
            "  [{}] {:>5}  {:<12} {:<28} {} record(s)",
            if item.is_completed { "x" } else { " " },
            item.item.id,
            item.item.category,
            item.item.product_name,
            item.record_count
        );
    }
}
