use panel_daemon::supervisor::Panel;
use panel_proto::config::Config;
use panel_proto::stations::StationList;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let data_dir = panel_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("panel.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // File for the record, stderr for whoever runs it in a terminal or under systemd
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,panel_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let stations = match StationList::load(&config.stations.playlist) {
        Ok(stations) => {
            info!(
                "Loaded {} stations from {:?}",
                stations.len(),
                config.stations.playlist
            );
            stations
        }
        Err(e) => {
            warn!(
                "Cannot read station list {:?}: {}; starting with none",
                config.stations.playlist, e
            );
            StationList::default()
        }
    };

    let mut panel = Panel::new(&config, stations);
    panel.run().await;

    Ok(())
}
