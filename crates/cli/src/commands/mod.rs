//! CLI subcommands.

pub mod migrate;
pub mod seed;

use secrecy::SecretString;

/// Errors shared by the database commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Repository error: {0}")]
    Repository(#[from] lamplight_storefront::db::RepositoryError),
}

const DATABASE_URL_VAR: &str = "LAMPLIGHT_DATABASE_URL";
const FALLBACK_DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Read the database URL from `LAMPLIGHT_DATABASE_URL`, falling back to
/// `DATABASE_URL`. Loads `.env` first if present.
pub fn database_url() -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();

    std::env::var(DATABASE_URL_VAR)
        .or_else(|_| std::env::var(FALLBACK_DATABASE_URL_VAR))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar(DATABASE_URL_VAR))
}
