use anyhow::Result;

mod app;
mod audio;
mod config;
mod core;
mod messaging;

use config::Settings;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting pitchmidi");

    let settings = Settings::load()?;
    let mut app = app::PitchApp::new(settings)
        .map_err(|e| anyhow::anyhow!("Failed to create app: {}", e))?;
    app.spawn_command_reader()?;
    app.run()
}
