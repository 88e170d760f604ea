use std::path::PathBuf;

use anyhow::Result;
use sheet_upload_bot::app::App;
use sheet_upload_bot::config::Config;
use sheet_upload_bot::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    // Optional config document path as the first argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    let app = App::initialize(config)?;
    app.run().await?;

    Ok(())
}
