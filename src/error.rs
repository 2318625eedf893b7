#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Setting up error reporting failed")]
    InstallingColorEyre(#[source] color_eyre::Report),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Display(#[from] crate::display::DisplayError),

    #[error("MQTT error")]
    Mqtt(#[source] MqttError),
}

#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("Failed to subscribe")]
    Subscribing(#[source] rumqttc::v5::ClientError),

    #[error("Connection failed")]
    Connection(#[source] rumqttc::v5::ConnectionError),
}
