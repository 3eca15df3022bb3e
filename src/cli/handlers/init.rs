//! Schema initialization handler

use crate::cli::output::print_success;
use crate::database::Database;
use crate::AppConfig;
use crate::Result;

pub async fn handle_init(config: &AppConfig) -> Result<()> {
    let database = Database::from_config(config).await?;
    database.init_schema().await?;
    print_success("Database schema initialized");
    Ok(())
}
