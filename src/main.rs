use tokio_util::sync::CancellationToken;

use pixelpanel::cli;
use pixelpanel::config::Config;
use pixelpanel::data::DataStore;
use pixelpanel::display::DdpDisplay;
use pixelpanel::display::NullDisplay;
use pixelpanel::driver::Driver;
use pixelpanel::driver::ALL_MODE;
use pixelpanel::error::Error;

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::eyre::Result<()> {
    setup_panic();
    color_eyre::install().map_err(Error::InstallingColorEyre)?;
    let cli = <cli::Cli as clap::Parser>::parse();
    pixelpanel::logging::setup(cli.verbosity);
    let config = Config::load(&cli.config).await.map_err(Error::Config)?;

    match cli.command {
        cli::Command::Run => {
            run(config).await?;
        }
        cli::Command::VerifyConfig => {
            verify(&config)?;
            tracing::info!("Configuration verified");
        }
    }

    Ok(())
}

fn setup_panic() {
    human_panic::setup_panic!(human_panic::Metadata::new(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ));
}

/// Build every sprite, scene and mode against a discarding display, so
/// all fail-fast construction errors surface without touching a socket.
fn verify(config: &Config) -> Result<(), Error> {
    let display = NullDisplay::new(config.display.width, config.display.height);
    let _ = Driver::build(config, display, DataStore::default())?;
    Ok(())
}

async fn run(config: Config) -> Result<(), Error> {
    let process_state = pixelpanel::systemd::ProcessState::new();
    process_state.set_starting();

    let display = DdpDisplay::connect(&config.display)?;

    let default_mode = config
        .panel
        .default_mode
        .clone()
        .unwrap_or_else(|| ALL_MODE.to_owned());
    let data = DataStore::seeded(
        &default_mode,
        config.display.initial_brightness,
        config.panel.random,
    );

    let driver = Driver::build(&config, display, data.clone())?;

    let cancellation_token = CancellationToken::new();

    tokio::task::spawn({
        let mqtt_config = config.mqtt.clone();
        let cancellation_token = cancellation_token.clone();
        let data = data.clone();
        async move {
            if let Err(error) = pixelpanel::mqtt::run(mqtt_config, cancellation_token, data).await
            {
                tracing::error!(?error, "MQTT processing failed");
            }
        }
    });

    tokio::task::spawn({
        let cancellation_token = cancellation_token.clone();
        async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(?error, "Failed to listen for ctrl-c");
            }
            tracing::info!("Ctrl-C received, shutting down");
            cancellation_token.cancel();
        }
    });

    process_state.set_running();
    let result = driver.run(cancellation_token.clone()).await;
    cancellation_token.cancel();
    match &result {
        Ok(()) => process_state.set_finished(),
        Err(_) => process_state.set_failed(),
    }

    result
}
