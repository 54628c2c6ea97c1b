use anyhow::Result;
use std::sync::Arc;

use script2video::core::config::Config;
use script2video::core::io::NativeStorage;
use script2video::core::session::SessionStore;
use script2video::services::catalog::Catalog;
use script2video::services::generation::create_generation_client;
use script2video::services::wizard::WizardManager;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // 1. Load Config
    // Defaults cover the simulated backend, so a missing config.yml is fine.
    let config = match Config::load_or_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please fix 'config.yml' or remove it to use the defaults.");
            return Err(e);
        }
    };

    config.ensure_directories()?;

    // 2. Session Store
    let storage = Arc::new(NativeStorage::new());
    let session = SessionStore::new(storage.clone(), &config.session_folder);

    // 3. Catalogs
    let catalog = Catalog::load(&config, storage.as_ref()).await?;

    // 4. Generation backend
    let generator = create_generation_client(&config)?;

    // 5. Run the wizard
    let mut manager = WizardManager::new(config, catalog, session, generator);
    manager.run().await
}
