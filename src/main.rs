mod app;
mod cli;
mod export;
mod input;
mod logging;

use anyhow::Result;
use app::App;
use cli::Settings;

fn main() -> Result<()> {
    logging::init_logger();

    let matches = cli::command().get_matches();
    let settings = Settings::from_matches(&matches)?;
    log::debug!("Settings: {:?}", settings);

    App::new(settings).run()
}
