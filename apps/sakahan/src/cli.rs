//! # CLI Commands
//!
//! One function per subcommand. Each returns a boxed error so `main` can
//! report it and exit non-zero.

use crate::api::auth::JwtAuth;
use crate::api::media::MediaStore;
use crate::api::{create_router, AppState};
use crate::config::{ServeArgs, TokenArgs};
use sakahan_core::{suitability, Store, User, UserId};
use std::path::Path;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

// =============================================================================
// INIT / STATUS
// =============================================================================

/// Create the database and seed the suitability levels.
///
/// Refuses to touch an existing file unless `force` is set, in which case
/// the file is deleted first.
pub fn cmd_init(db_path: &Path, force: bool) -> CliResult {
    if db_path.exists() {
        if !force {
            return Err(format!(
                "Database already exists at {:?}. Use --force to overwrite.",
                db_path
            )
            .into());
        }
        std::fs::remove_file(db_path)?;
    }
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let store = Store::open(db_path)?;
    let seeded = store.write(suitability::seed)?;
    tracing::info!(path = ?db_path, seeded, "database initialized");
    println!("Initialized database at {:?} ({} suitability levels)", db_path, seeded);
    Ok(())
}

/// Print record counts.
pub fn cmd_status(db_path: &Path, json: bool) -> CliResult {
    if !db_path.exists() {
        return Err(format!("No database at {:?}. Run `sakahan init` first.", db_path).into());
    }
    let counts = Store::open(db_path)?.counts()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!("Database: {:?}", db_path);
        println!("  Crops:              {}", counts.crops);
        println!("  Crop elements:      {}", counts.crop_elements);
        println!("  Suitability levels: {}", counts.suitability_levels);
        println!("  Users:              {}", counts.users);
        println!("  Contributions:      {}", counts.contributions);
        println!("  Geometry features:  {}", counts.geometry_features);
        println!("  Comments:           {}", counts.comments);
        println!("  Files:              {}", counts.files);
        println!("  Legacy crops:       {}", counts.legacy_crops);
        println!("  Legacy elements:    {}", counts.legacy_crop_elements);
    }
    Ok(())
}

// =============================================================================
// TOKEN
// =============================================================================

/// Mint an access token for local development.
pub fn mint_token(args: &TokenArgs) -> Result<String, Box<dyn std::error::Error>> {
    let auth = JwtAuth::new(args.jwt_secret.clone())?;
    let user = User {
        id: UserId(args.user),
        email: args.email.clone(),
        first_name: args.first_name.clone(),
        last_name: args.last_name.clone(),
        role: args.role,
    };
    let ttl = u64::from(args.ttl_hours).saturating_mul(3600);
    Ok(auth.issue(&user, ttl)?)
}

pub fn cmd_token(args: &TokenArgs) -> CliResult {
    println!("{}", mint_token(args)?);
    Ok(())
}

// =============================================================================
// SERVE
// =============================================================================

/// Open the store, seed it, and serve the API until Ctrl+C.
pub async fn cmd_serve(db_path: &Path, args: ServeArgs) -> CliResult {
    let jwt = JwtAuth::new(args.jwt_secret.clone())?;
    let addr = args.bind_addr()?;

    tokio::fs::create_dir_all(&args.media_dir).await?;
    let media = MediaStore::new(&args.media_dir);

    let store = Store::open(db_path)?;
    let seeded = store.write(suitability::seed)?;
    if seeded > 0 {
        tracing::info!(seeded, "seeded suitability levels");
    }

    tracing::info!(media = ?media.root(), "serving attachments");
    let state = AppState::new(store, jwt, media, args.rate_limit);
    let app = create_router(state, args.cors_origin.as_deref());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, database = ?db_path, "Sakahan server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
