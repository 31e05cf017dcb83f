use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::RelayError;
use crate::messages::DeviceRequest;
use crate::mqtt::MqttClient;
use crate::relay::Relay;

pub struct Manager {
    relay: Arc<Relay>,
    mqtt_client: MqttClient,
    mqtt_event_loop: rumqttc::EventLoop,
}

impl Manager {
    pub fn new(
        relay: Relay,
        mqtt_client: MqttClient,
        mqtt_event_loop: rumqttc::EventLoop,
    ) -> Self {
        Manager {
            relay: Arc::new(relay),
            mqtt_client,
            mqtt_event_loop,
        }
    }

    /// Handles device requests one at a time until Ctrl-C.
    pub async fn run_loop(self) -> Result<(), rumqttc::ClientError> {
        let Manager {
            relay,
            mqtt_client,
            mut mqtt_event_loop,
        } = self;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let event_client = mqtt_client.clone();
        let mqtt_handle = tokio::task::spawn(async move {
            event_client
                .event_loop(&mut mqtt_event_loop, tx, shutdown_rx)
                .await;
        });

        info!("Relay ready, listening on {}", mqtt_client.request_topic());

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(request) => handle_request(&relay, &mqtt_client, request).await,
                    None => {
                        debug!("Request channel closed");
                        break;
                    }
                },
                _ = &mut ctrl_c => {
                    info!("Shutting down");
                    break;
                }
            }
        }

        let disconnected = mqtt_client.disconnect().await;
        let _ = shutdown_tx.send(());
        if let Err(err) = mqtt_handle.await {
            error!("MQTT event loop task failed: {:?}", err);
        }
        info!("Exiting manager event loop");

        disconnected
    }
}

async fn handle_request(relay: &Arc<Relay>, mqtt_client: &MqttClient, request: DeviceRequest) {
    match request {
        DeviceRequest::FetchStatus => {
            info!("Received status request");
            let status = relay.fetch_status().await;
            debug!("Current visitor: {:?}", relay.current_visitor().await);
            if let Err(err) = mqtt_client.publish_status(&status).await {
                error!("Error publishing door status: {:?}", err);
            }
        }
        DeviceRequest::SendReply(message) => {
            info!("Received reply request");
            // Nobody waits on the outcome; it is only logged.
            spawn_reply(Arc::clone(relay), message);
        }
    }
}

fn spawn_reply(relay: Arc<Relay>, message: String) -> JoinHandle<()> {
    tokio::task::spawn(async move {
        match relay.send_reply(&message).await {
            Ok(()) => debug!("Reply delivered"),
            Err(RelayError::InvalidState(reason)) => warn!("Reply not sent: {}", reason),
            Err(err) => error!("Error sending reply: {}", err),
        }
    })
}
