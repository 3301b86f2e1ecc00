//! Environment loading shared by the script binaries.

use std::path::PathBuf;

pub struct CatalogConfig {
    pub database_url: String,
    pub project_root: String,
}

/// Load `web/.env` the way the deployment lays the repo out: relative to the
/// script's working directory, or via `PROJECT_ROOT`.
pub fn load_config() -> CatalogConfig {
    let env_paths = [PathBuf::from("web/.env"), PathBuf::from("../../web/.env")];

    let mut env_loaded = false;
    for p in &env_paths {
        if p.exists() {
            dotenvy::from_path(p).ok();
            env_loaded = true;
            break;
        }
    }

    if !env_loaded {
        if let Ok(project_root) = std::env::var("PROJECT_ROOT") {
            let env_path = PathBuf::from(&project_root).join("web/.env");
            if env_path.exists() {
                dotenvy::from_path(env_path).ok();
            }
        }
    }

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set in web/.env");

    let project_root = std::env::var("PROJECT_ROOT").unwrap_or_else(|_| {
        std::env::current_dir()
            .ok()
            .and_then(|d| {
                // Scripts run from scripts/<name>, scripts/ or the repo root.
                if d.ends_with("scripts/import")
                    || d.ends_with("scripts/merge")
                    || d.ends_with("scripts/sync")
                {
                    d.parent()
                        .and_then(|p| p.parent())
                        .map(|p| p.to_string_lossy().to_string())
                } else if d.ends_with("scripts") {
                    d.parent().map(|p| p.to_string_lossy().to_string())
                } else {
                    Some(d.to_string_lossy().to_string())
                }
            })
            .unwrap_or_else(|| ".".to_string())
    });

    CatalogConfig {
        database_url,
        project_root,
    }
}
