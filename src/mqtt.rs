use rumqttc::v5::MqttOptions;
use tokio_util::sync::CancellationToken;

use crate::data::DataStore;
use crate::error::MqttError;

/// Subscribe to every topic under the configured prefix and mirror
/// publishes into the data store. The scheduler picks the values up on
/// its next interval.
pub async fn run(
    config: crate::config::MqttConfig,
    cancellation_token: CancellationToken,
    data: DataStore,
) -> Result<(), MqttError> {
    let mut mqttoptions =
        MqttOptions::new(&config.client_name, config.host.to_string(), config.port);
    mqttoptions.set_keep_alive(config.keep_alive);

    let (client, mut eventloop) = rumqttc::v5::AsyncClient::new(mqttoptions, 100);

    let topic = format!("{prefix}/#", prefix = config.topic_prefix);
    let qos = rumqttc::v5::mqttbytes::QoS::from(config.qos);

    let Some(sub_result) = cancellation_token
        .run_until_cancelled(client.subscribe(topic.clone(), qos))
        .await
    else {
        tracing::info!("Cancelled, shutting down MQTT processing");
        return Ok(());
    };
    tracing::info!("Successfully subscribed to {topic}");

    sub_result.map_err(MqttError::Subscribing)?;

    loop {
        let event = cancellation_token
            .run_until_cancelled(eventloop.poll())
            .await;

        let Some(event) = event else {
            tracing::info!("cancelled, shutting down MQTT processing");
            break;
        };

        let event = event.map_err(MqttError::Connection)?;

        match event {
            rumqttc::v5::Event::Incoming(rumqttc::v5::Incoming::Publish(publish)) => {
                tracing::debug!(topic = ?publish.topic, payload = ?publish.payload, "Received payload");

                let Ok(topic) = std::str::from_utf8(&publish.topic) else {
                    tracing::debug!("Non-UTF-8 topic, ignoring");
                    continue;
                };
                apply_publish(&data, topic, &publish.payload);
            }

            rumqttc::v5::Event::Incoming(_) => {
                // nothing
            }

            rumqttc::v5::Event::Outgoing(_outgoing) => {
                // nothing
            }
        }
    }

    Ok(())
}

/// The final topic segment names the data key; the payload is its value.
/// Everything is a string at this boundary, so a publish cannot fail.
pub(crate) fn apply_publish(data: &DataStore, topic: &str, payload: &[u8]) {
    let key = topic.rsplit('/').next().unwrap_or(topic);
    data.set(key, String::from_utf8_lossy(payload).into_owned());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_maps_topic_tail_to_key() {
        let data = DataStore::default();
        apply_publish(&data, "pixelpanel/mode", b"night");
        assert_eq!(data.get("mode"), "night");
    }

    #[test]
    fn test_publish_without_slashes_uses_whole_topic() {
        let data = DataStore::default();
        apply_publish(&data, "brightness", b"42");
        assert_eq!(data.get("brightness"), "42");
    }

    #[test]
    fn test_publish_overwrites_previous_value() {
        let data = DataStore::seeded("all", 100, false);
        apply_publish(&data, "pixelpanel/mode", b"night");
        apply_publish(&data, "pixelpanel/mode", b"morning");
        assert_eq!(data.get("mode"), "morning");
    }

    #[test]
    fn test_non_utf8_payload_is_stored_lossily() {
        let data = DataStore::default();
        apply_publish(&data, "pixelpanel/note", &[0xff, 0xfe]);
        assert!(!data.get("note").is_empty());
    }
}
