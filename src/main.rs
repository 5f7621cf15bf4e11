use field_coordinator::config::CoordinatorConfig;
use field_coordinator::runtime::Runtime;
use field_coordinator::util::log::init_file_logger;
use field_coordinator::{log_info, log_warn};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // stdout may carry the record protocol, so diagnostics go to stderr
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    color_eyre::install()?;

    let config = match std::env::args().nth(1) {
        Some(path) => CoordinatorConfig::load(&path)?,
        None => {
            let mut config = CoordinatorConfig::default();
            if let Ok(port) = std::env::var("COORD_PORT") {
                config.port.path = Some(port);
            }
            config
        }
    };

    if let Some(dir) = &config.port.log_dir {
        if let Err(e) = init_file_logger(dir) {
            log_warn!("File logging disabled, cannot open {}: {}", dir, e);
        }
    }

    log_info!(
        "Starting field coordinator (pan=0x{:04X}, ch={})",
        config.network.pan_id,
        config.network.channel
    );
    Runtime::new(config).run().await?;
    Ok(())
}
