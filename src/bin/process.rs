use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};

use bolingest::Config;
use bolingest::db::Db;
use bolingest::link::RequesterRole;
use bolingest::ocr::{HttpOcrClient, OcrInvoker};
use bolingest::pipeline::{IngestionPipeline, UploadRequest};
use bolingest::repo::{DocumentRepository, SqliteDocumentRepository};

#[derive(Parser, Debug)]
#[command(name = "process")]
#[command(about = "Ingest a BOL document: OCR, field extraction, optional appointment link")]
struct Args {
    /// Path to the document to ingest
    file: PathBuf,

    /// Tenant the upload belongs to
    #[arg(short, long)]
    tenant: String,

    /// Uploading user id
    #[arg(short, long)]
    user: String,

    /// Appointment to link the document to after processing
    #[arg(short, long)]
    appointment: Option<String>,

    /// Act with super-admin capability (cross-tenant linking)
    #[arg(long)]
    super_admin: bool,

    /// MIME type of the upload (guessed from the extension when omitted)
    #[arg(short, long)]
    mime_type: Option<String>,
}

fn guess_mime_type(path: &Path) -> String {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.service.log_level),
    )
    .init();

    log::info!("Database path: {}", config.db_path().display());
    log::info!("OCR backend: {}", config.ocr.endpoint);

    let repo = Arc::new(SqliteDocumentRepository::new(Db::new(config.db_path())));
    repo.migrate().await?;

    let client = HttpOcrClient::new(
        config.ocr.endpoint.clone(),
        // Transport safety net one step beyond the largest pipeline budget
        Duration::from_secs(config.ocr.file_timeout_secs + 5),
    );
    let invoker = OcrInvoker::new(Arc::new(client), &config.ocr);

    let pipeline = IngestionPipeline::new(
        repo as Arc<dyn DocumentRepository>,
        invoker,
        config.uploads.clone(),
    );

    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let file_name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let mime_type = args
        .mime_type
        .clone()
        .unwrap_or_else(|| guess_mime_type(&args.file));

    let role = if args.super_admin {
        RequesterRole::SuperAdmin
    } else {
        RequesterRole::Member
    };

    let outcome = pipeline
        .process(UploadRequest {
            bytes,
            file_name,
            mime_type,
            tenant_id: args.tenant,
            user_id: args.user,
            appointment_id: args.appointment,
            requester_role: role,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}
