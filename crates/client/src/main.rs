//! Chatline - terminal client for the realtime chat session.
//!
//! Lines typed on stdin are sent as chat messages. `/dismiss` clears the
//! visible notification, `/quit` disconnects and exits.

use anyhow::Context;
use chatline_client::notifications::{DeliveryQueue, NotificationBus, StatusBoard};
use chatline_client::reachability::{ChannelSensor, ReachabilityMonitor, TcpProbeSensor};
use chatline_client::ws::{connect_with_retry, observer, ConnectionManager, TungsteniteTransport};
use chatline_client::{log_info, log_warn, logging, ClientConfig};
use chatline_shared::MessageEnvelope;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = ClientConfig::from_env();
    let session = config.session();
    log_info!("Starting chatline against {}", config.ws_url);

    let bus = NotificationBus::new();
    let queue = DeliveryQueue::spawn(&bus, config.notice_timeout);

    let reachability = match &config.probe {
        Some(probe) => ReachabilityMonitor::spawn(TcpProbeSensor::new(probe.addr.clone(), probe.interval)),
        None => {
            // No platform callback on a plain terminal: stay "online".
            let (sensor, _handle) = ChannelSensor::new();
            ReachabilityMonitor::spawn(sensor)
        }
    };

    let mut board = StatusBoard::new(queue.active(), reachability.offline());
    let status_task = tokio::spawn(async move {
        while let Some(snapshot) = board.changed().await {
            if snapshot.offline {
                println!("[offline] You are offline");
            }
            if let Some(event) = snapshot.notification {
                println!("[notice #{}] {}", event.seq, event.message);
            }
        }
    });

    let manager = ConnectionManager::with_handshake_timeout(
        TungsteniteTransport::new(),
        bus.clone(),
        config.handshake_timeout,
    );
    manager.subscribe(observer(|envelope: &MessageEnvelope| {
        match envelope {
            MessageEnvelope::Chat(chat) => {
                let author = chat.author.as_deref().unwrap_or("someone");
                println!("<{}> {}", author, chat.text);
            }
            MessageEnvelope::Presence(update) => println!("* {} is {:?}", update.user, update.status),
            MessageEnvelope::Error(err) => println!("! server error {}: {}", err.code, err.message),
            _ => {}
        }
        Ok(())
    }));

    if let Err(e) = connect_with_retry(&manager, &session, &config.reconnect).await {
        log_warn!("Starting without a connection: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/dismiss" => queue.dismiss_current(),
            "/connect" => {
                if let Err(e) = manager.connect(&session).await {
                    log_warn!("Connect failed: {}", e);
                }
            }
            "/state" => println!("state: {}", manager.connection_state()),
            text => manager.send_chat(text, None),
        }
    }

    manager.disconnect();
    status_task.abort();
    Ok(())
}
