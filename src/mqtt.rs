use std::time::Duration;

use log::{debug, error, info, warn};
use rumqttc::{MqttOptions, QoS};
use tokio::sync::{broadcast, mpsc};

use crate::{
    config,
    messages::{DeviceRequest, StatusMessage},
};

#[derive(Debug, Clone)]
pub struct MqttClient {
    client: rumqttc::AsyncClient,
    device_topic: String,
}

impl MqttClient {
    pub fn new(config: &config::MqttConfig, device_name: &str) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .as_ref()
            .unwrap_or(&"doorbell-relay".to_string())
            .to_string();

        let mut mqttoptions =
            MqttOptions::new(publisher_id, config.host.clone(), config.port.unwrap_or(1883));

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(5)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        let topic_path = config.topic_path.clone().unwrap_or("doorbell".to_string());
        (
            MqttClient {
                client,
                device_topic: device_topic(&topic_path, device_name),
            },
            eventloop,
        )
    }

    pub fn request_topic(&self) -> String {
        format!("{}/request", self.device_topic)
    }

    pub fn status_topic(&self) -> String {
        format!("{}/status", self.device_topic)
    }

    pub async fn subscribe(&self) -> Result<(), rumqttc::ClientError> {
        self.client
            .subscribe(self.request_topic(), QoS::AtMostOnce)
            .await
    }

    /// Polls the broker until `shutdown` fires, forwarding device requests to `tx`.
    pub async fn event_loop(
        &self,
        eventloop: &mut rumqttc::EventLoop,
        tx: mpsc::UnboundedSender<DeviceRequest>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            let event = tokio::select! {
                event = eventloop.poll() => event,
                _ = shutdown.recv() => {
                    debug!("Stopping MQTT event loop");
                    break;
                }
            };

            match event {
                Ok(notification) => match notification {
                    rumqttc::Event::Incoming(rumqttc::Packet::Publish(p)) => {
                        debug!("Received MQTT message on topic {}: {:?}", p.topic, p.payload);

                        forward_request(&p.payload, &tx);
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::SubAck(_)) => {
                        debug!("Subscription acknowledged");
                    }
                    rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) => {
                        debug!("Connection acknowledged");
                        if let Err(err) = self.subscribe().await {
                            error!("Error subscribing to MQTT topics: {:?}", err);
                        }
                    }
                    _ => {}
                },
                Err(e) => {
                    error!("Error polling MQTT event loop: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    pub async fn publish_status(
        &self,
        status: &StatusMessage,
    ) -> Result<(), rumqttc::ClientError> {
        info!("Publishing door status {} to device", status.status);
        // Serializing a struct of plain fields cannot fail.
        let payload = serde_json::to_string(status).unwrap_or_default();
        self.client
            .publish(self.status_topic(), QoS::AtMostOnce, false, payload)
            .await
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("Disconnecting MQTT client");
        self.client.disconnect().await
    }
}

/// Decodes a device payload and queues it. The queue is unbounded so a slow
/// fetch never causes later requests to be dropped.
fn forward_request(payload: &[u8], tx: &mpsc::UnboundedSender<DeviceRequest>) {
    match DeviceRequest::from_payload(payload) {
        Ok(Some(request)) => {
            if let Err(err) = tx.send(request) {
                error!("Error forwarding device request: {:?}", err);
            }
        }
        Ok(None) => debug!("Ignoring empty device request"),
        Err(err) => warn!("Dropping malformed device request: {}", err),
    }
}

fn device_topic(topic_path: &str, device_name: &str) -> String {
    format!("{}/{}", topic_path, sanitize_name(device_name))
}

fn sanitize_name(name: &str) -> String {
    // Remove any non-alphanumeric characters and replace spaces with underscores
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
}
