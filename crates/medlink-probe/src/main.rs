//! # Medlink Probe
//!
//! Connects to a Medlink hub as a hospital, optionally raises an emergency
//! request, alert or pairing request, and prints everything the hub sends
//! back. Handy for smoke-testing a deployment from a terminal.
//!
//! ## Usage
//! ```bash
//! # Join and watch presence for 30 seconds
//! medlink-probe --id h1 --name "St. Mary" --listen-secs 30
//!
//! # Broadcast a high-urgency blood request over the event-framed adapter
//! medlink-probe --id h2 --name "City General" --url ws://127.0.0.1:5000/events \
//!     --framing event --emergency blood --urgency high --description "4 units O-"
//!
//! # Stay online and accept every pairing request and emergency
//! medlink-probe --id h3 --name "North Clinic" --auto-accept --listen-secs 0
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use futures::{SinkExt, StreamExt};
use medlink_common::constants::{BROADCAST_TARGET, DEFAULT_HUB_URL};
use medlink_common::protocol::{
    ChatEnvelope, EmergencyAcceptance, EmergencyAlert, EmergencyDispatch, PairRequest,
};
use medlink_common::{
    ClientMessage, EmergencyRequest, EventFrameCodec, HospitalIdentity, JsonEnvelopeCodec,
    RouteTarget, ServerMessage, Urgency, WireCodec,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

type HubSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Wire framing to speak
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Framing {
    /// `{"type": kind, "payload": ...}` (hub path `/ws`)
    Json,
    /// `["kind", payload]` (hub path `/events`)
    Event,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UrgencyArg {
    High,
    Medium,
    Low,
}

impl From<UrgencyArg> for Urgency {
    fn from(value: UrgencyArg) -> Self {
        match value {
            UrgencyArg::High => Urgency::High,
            UrgencyArg::Medium => Urgency::Medium,
            UrgencyArg::Low => Urgency::Low,
        }
    }
}

/// Medlink Probe - command-line hospital client
#[derive(Parser, Debug)]
#[command(name = "medlink-probe")]
#[command(author, version, about = "Exercise a Medlink hub from the command line", long_about = None)]
struct Args {
    /// Hub WebSocket URL
    #[arg(long, default_value = DEFAULT_HUB_URL, env = "MEDLINK_HUB_URL")]
    url: String,

    /// Wire framing (must match the URL path)
    #[arg(long, value_enum, default_value = "json")]
    framing: Framing,

    /// Hospital id to register as
    #[arg(long)]
    id: String,

    /// Hospital display name
    #[arg(long)]
    name: String,

    #[arg(long, default_value = "")]
    city: String,

    #[arg(long, default_value = "")]
    contact: String,

    /// Latitude (requires --lng)
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude (requires --lat)
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lng: Option<f64>,

    /// Raise an emergency request of this type (e.g. blood, icu-bed)
    #[arg(long, value_name = "TYPE")]
    emergency: Option<String>,

    #[arg(long, value_enum, default_value = "medium")]
    urgency: UrgencyArg,

    #[arg(long, default_value = "")]
    description: String,

    /// Emergency target: a hospital id or "broadcast"
    #[arg(long, default_value = BROADCAST_TARGET)]
    to: String,

    /// Send a free-text alert to every other hospital
    #[arg(long)]
    alert: Option<String>,

    /// Ask this hospital to pair
    #[arg(long, value_name = "HOSPITAL_ID")]
    connect_to: Option<String>,

    /// Send a chat message (requires --chat-to)
    #[arg(long, requires = "chat_to")]
    chat: Option<String>,

    #[arg(long, value_name = "HOSPITAL_ID")]
    chat_to: Option<String>,

    /// Accept incoming pairing and emergency requests
    #[arg(long)]
    auto_accept: bool,

    /// Seconds to keep listening after the actions (0 = until Ctrl+C)
    #[arg(long, default_value = "10")]
    listen_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,
}

impl Args {
    fn identity(&self) -> HospitalIdentity {
        let identity = HospitalIdentity::new(&self.id, &self.name)
            .with_city(&self.city)
            .with_contact(&self.contact);

        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => identity.with_location(lat, lng),
            _ => identity,
        }
    }

    fn codec(&self) -> Box<dyn WireCodec> {
        match self.framing {
            Framing::Json => Box::new(JsonEnvelopeCodec),
            Framing::Event => Box::new(EventFrameCodec),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let me = args.identity();
    me.validate()?;
    let codec = args.codec();

    println!("🏥 Medlink Probe");
    println!("================");
    println!("Hub:      {} ({})", args.url, codec.name());
    println!("Hospital: {} ({})", me.name, me.id);
    println!();

    let (mut socket, _) = tokio_tungstenite::connect_async(args.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;

    send(&mut socket, codec.as_ref(), &ClientMessage::Register(me.clone())).await?;
    wait_for_confirmation(&mut socket, codec.as_ref()).await?;
    info!(id = %me.id, "✅ Registered");

    for action in planned_actions(&args, &me) {
        info!(kind = action.kind(), "➡ Sending");
        send(&mut socket, codec.as_ref(), &action).await?;
    }

    let listen = async {
        loop {
            let Some(message) = recv(&mut socket, codec.as_ref()).await? else {
                warn!("Hub closed the connection");
                return Ok::<_, anyhow::Error>(());
            };
            print_message(&message);

            if args.auto_accept {
                if let Some(reply) = auto_reply(&me, &message) {
                    info!(kind = reply.kind(), "➡ Auto-replying");
                    send(&mut socket, codec.as_ref(), &reply).await?;
                }
            }
        }
    };

    if args.listen_secs == 0 {
        tokio::select! {
            result = listen => result?,
            _ = tokio::signal::ctrl_c() => info!("🛑 Interrupted"),
        }
    } else {
        match tokio::time::timeout(Duration::from_secs(args.listen_secs), listen).await {
            Ok(result) => result?,
            Err(_) => debug!(secs = args.listen_secs, "Listen window elapsed"),
        }
    }

    println!();
    println!("👋 Done");
    Ok(())
}

/// Messages to send right after registering, in order
fn planned_actions(args: &Args, me: &HospitalIdentity) -> Vec<ClientMessage> {
    let mut actions = Vec::new();

    if let Some(ref peer) = args.connect_to {
        actions.push(ClientMessage::ConnectionRequest(PairRequest::new(&me.id, peer)));
    }

    if let Some(ref request_type) = args.emergency {
        let request = EmergencyRequest::new(
            new_request_id(),
            request_type,
            args.urgency.into(),
            &args.description,
            me.clone(),
        );
        match serde_json::to_value(&request) {
            Ok(body) => actions.push(ClientMessage::EmergencyRequest(EmergencyDispatch {
                to: RouteTarget::from(args.to.as_str()),
                request: body,
            })),
            Err(e) => warn!(error = %e, "Skipping emergency request that failed to encode"),
        }
    }

    if let Some(ref message) = args.alert {
        actions.push(ClientMessage::EmergencyAlert(EmergencyAlert {
            from_id: me.id.clone(),
            message: message.clone(),
        }));
    }

    if let (Some(text), Some(to)) = (&args.chat, &args.chat_to) {
        actions.push(ClientMessage::ChatMessage(ChatEnvelope {
            to: to.clone(),
            message: serde_json::json!({
                "text": text,
                "timestamp": chrono::Utc::now(),
                "from": me,
            }),
        }));
    }

    actions
}

/// What an auto-accepting hospital answers to `message`, if anything
fn auto_reply(me: &HospitalIdentity, message: &ServerMessage) -> Option<ClientMessage> {
    match message {
        ServerMessage::ConnectionRequest { identity } if identity.id != me.id => Some(
            ClientMessage::ConnectionAccepted(PairRequest::new(&identity.id, &me.id)),
        ),
        ServerMessage::EmergencyRequest(body) => {
            let request: EmergencyRequest = serde_json::from_value(body.clone()).ok()?;
            if request.originator.id == me.id {
                return None;
            }
            Some(ClientMessage::EmergencyAccepted(EmergencyAcceptance {
                request_id: body.get("id").cloned()?,
                to: request.originator.id,
                identity: me.clone(),
            }))
        }
        _ => None,
    }
}

fn new_request_id() -> String {
    format!(
        "req-{}-{:06x}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>() & 0xff_ffff
    )
}

async fn send(socket: &mut HubSocket, codec: &dyn WireCodec, message: &ClientMessage) -> Result<()> {
    let text = codec.encode(&message.to_frame()?)?;
    socket
        .send(Message::text(text))
        .await
        .context("Failed to send frame")
}

/// Next hub message, skipping control frames and anything undecodable
async fn recv(socket: &mut HubSocket, codec: &dyn WireCodec) -> Result<Option<ServerMessage>> {
    while let Some(next) = socket.next().await {
        let text = match next.context("WebSocket read failed")? {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(None),
            _ => continue,
        };

        match codec
            .decode(text.as_str())
            .and_then(ServerMessage::from_frame)
        {
            Ok(message) => return Ok(Some(message)),
            Err(e) => warn!(error = %e, "Ignoring undecodable frame"),
        }
    }
    Ok(None)
}

async fn wait_for_confirmation(socket: &mut HubSocket, codec: &dyn WireCodec) -> Result<()> {
    let confirm = async {
        loop {
            match recv(socket, codec).await? {
                Some(ServerMessage::RegistrationConfirmed { .. }) => return Ok(()),
                Some(ServerMessage::Error { reason, message }) => {
                    bail!("Registration rejected ({reason}): {message}")
                }
                Some(other) => print_message(&other),
                None => bail!("Hub closed the connection before confirming registration"),
            }
        }
    };

    tokio::time::timeout(Duration::from_secs(5), confirm)
        .await
        .context("Timed out waiting for registrationConfirmed")?
}

fn print_message(message: &ServerMessage) {
    match message {
        ServerMessage::PresenceList(snapshot) => {
            println!("⬅ presence (rev {}): {} online", snapshot.revision, snapshot.len());
            for entry in &snapshot.sessions {
                let marker = if entry.paired { "🤝" } else { "  " };
                println!("   {marker} {:<16} {} {}", entry.id, entry.name, entry.city);
            }
        }
        other => match other.to_frame() {
            Ok(frame) => println!("⬅ {}: {}", frame.kind, frame.payload),
            Err(_) => println!("⬅ {}", other.kind()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn me() -> HospitalIdentity {
        HospitalIdentity::new("h3", "North Clinic")
    }

    #[test]
    fn test_auto_accepts_pairing_from_others() {
        let reply = auto_reply(
            &me(),
            &ServerMessage::ConnectionRequest {
                identity: HospitalIdentity::new("h1", "St. Mary"),
            },
        );
        assert_eq!(
            reply,
            Some(ClientMessage::ConnectionAccepted(PairRequest::new("h1", "h3")))
        );
    }

    #[test]
    fn test_auto_accepts_foreign_emergency_only() {
        let origin = HospitalIdentity::new("h1", "St. Mary");
        let request = EmergencyRequest::new("req-1", "blood", Urgency::High, "", origin);
        let body = serde_json::to_value(&request).unwrap();

        match auto_reply(&me(), &ServerMessage::EmergencyRequest(body.clone())) {
            Some(ClientMessage::EmergencyAccepted(acceptance)) => {
                assert_eq!(acceptance.request_id, json!("req-1"));
                assert_eq!(acceptance.to, "h1");
                assert_eq!(acceptance.identity.id, "h3");
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        // Our own broadcast comes back to us too; never accept it
        let own = HospitalIdentity::new("h1", "St. Mary");
        assert!(auto_reply(&own, &ServerMessage::EmergencyRequest(body)).is_none());

        // Unparseable requests are ignored
        assert!(auto_reply(&me(), &ServerMessage::EmergencyRequest(json!("junk"))).is_none());
    }

    #[test]
    fn test_planned_actions_order() {
        let args = Args::parse_from([
            "medlink-probe",
            "--id",
            "h1",
            "--name",
            "St. Mary",
            "--connect-to",
            "h2",
            "--emergency",
            "icu-bed",
            "--urgency",
            "high",
            "--alert",
            "Power outage",
        ]);
        let kinds: Vec<_> = planned_actions(&args, &args.identity())
            .iter()
            .map(ClientMessage::kind)
            .collect();
        assert_eq!(kinds, vec!["connectionRequest", "emergencyRequest", "emergencyAlert"]);
    }

    #[test]
    fn test_identity_from_args() {
        let args = Args::parse_from([
            "medlink-probe",
            "--id",
            "h1",
            "--name",
            "St. Mary",
            "--lat",
            "-33.9",
            "--lng",
            "18.4",
        ]);
        let identity = args.identity();
        assert_eq!(identity.location.map(|l| l.lat), Some(-33.9));
        assert!(matches!(args.framing, Framing::Json));
    }
}
