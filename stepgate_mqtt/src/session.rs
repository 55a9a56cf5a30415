//! Broker session.
//!
//! Subscribes to the command topic on every ConnAck so a reconnect renews
//! the subscription, and hands each publish on that topic to the
//! dispatcher. The loop blocks only on the network read; servo stepping runs
//! on its own thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use stepgate_common::mqtt::MqttConfig;
use stepgate_control::{BridgeDispatcher, DispatchOutcome};
use tracing::{debug, info, warn};

/// Pause before the connection iterator retries after an error.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Request queue depth between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 16;

/// What the session does with one incoming packet.
#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    /// Connection (re)established; subscribe.
    Subscribe,
    /// Publish on the command topic; dispatch the payload.
    Command(&'a [u8]),
    /// Anything else.
    Ignore,
}

/// Classify an incoming packet.
pub fn route<'a>(packet: &'a Packet, topic: &str) -> Route<'a> {
    match packet {
        Packet::ConnAck(_) => Route::Subscribe,
        Packet::Publish(publish) if publish.topic == topic => Route::Command(&publish.payload),
        Packet::Publish(publish) => {
            debug!(topic = %publish.topic, "Publish on unexpected topic");
            Route::Ignore
        }
        _ => Route::Ignore,
    }
}

/// Broker options for `config`.
pub fn options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(config.keep_alive());
    options
}

/// Client handle and the connection to poll.
pub fn connect(config: &MqttConfig) -> (Client, Connection) {
    info!(
        host = %config.host,
        port = config.port,
        client_id = %config.client_id,
        "Connecting to broker"
    );
    Client::new(options(config), REQUEST_CAPACITY)
}

/// Poll `connection` until `running` clears.
pub fn run(
    config: &MqttConfig,
    dispatcher: &BridgeDispatcher,
    running: &AtomicBool,
    client: &Client,
    mut connection: Connection,
) {
    for notification in connection.iter() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        match notification {
            Ok(Event::Incoming(packet)) => match route(&packet, &config.topic) {
                Route::Subscribe => {
                    info!(topic = %config.topic, "Connected; subscribing");
                    // The event loop runs on this thread; never block on its queue.
                    if let Err(e) = client.try_subscribe(&config.topic, QoS::AtLeastOnce) {
                        warn!(error = %e, "Subscribe request not queued");
                    }
                }
                Route::Command(payload) => {
                    if let DispatchOutcome::Accepted { target } = dispatcher.handle_wire(payload) {
                        debug!(target = target.position(), "Motion queued");
                    }
                }
                Route::Ignore => {}
            },
            Ok(Event::Outgoing(_)) => {}
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                warn!(error = %e, "Broker connection error; retrying");
                thread::sleep(RECONNECT_DELAY);
            }
        }
    }
    info!(stats = %dispatcher.stats(), "Broker session ended");
}

// ─── Tests ──────────────────────────────────────────────────────────
