//! End-to-end relay walkthrough over the loopback transport
//!
//! Runs the whole orchestration path in one process: a broadcaster
//! negotiates and publishes audio+video, two viewers negotiate and attach
//! the relayed tracks, frames fan out, and the server drains on shutdown.
//!
//! ```sh
//! cargo run --example loopback_relay
//! ```

use std::time::Duration;

use bytes::Bytes;
use rtc_relay::server::RelayServer;
use rtc_relay::transport::{LoopbackFactory, SessionDescription, TransportState};
use rtc_relay::{TrackFrame, TrackKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let factory = LoopbackFactory::new();
    let server = RelayServer::new(factory.clone());

    // Broadcaster submits its offer; the answer comes back before any media
    let answer = server
        .publish(SessionDescription::offer("v=0\r\nm=audio\r\nm=video\r\n"))
        .await?;
    println!("broadcaster answer: {:?}", answer.sdp_type);

    // The transport engine reports the broadcaster's inbound tracks
    let broadcaster = factory.created(0).expect("broadcaster transport");
    broadcaster.set_state(TransportState::Connected);
    broadcaster.deliver_track(factory.new_track(TrackKind::Audio));
    broadcaster.deliver_track(factory.new_track(TrackKind::Video));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let audio = server
        .relay()
        .source(TrackKind::Audio)
        .await
        .expect("audio source published");

    // Two viewers negotiate independently
    for n in 1..=2 {
        let answer = server
            .view(SessionDescription::offer("v=0\r\nm=audio\r\nm=video\r\n"))
            .await?;
        println!("viewer {} answer sdp:\n{}", n, answer.sdp);
    }

    // Relay a few audio frames; both viewers' media paths receive them
    let mut tap = server.relay().subscribe(TrackKind::Audio).await?;
    for ts in [0u32, 960, 1920] {
        audio.feed(TrackFrame::new(Bytes::from_static(&[0xAF, 0x01]), ts, false));
    }
    while let Ok(frame) = tap.try_recv() {
        println!("relayed audio frame at ts {}", frame.timestamp);
    }

    let report = server.shutdown().await;
    println!(
        "shutdown: {} closed, {} failures",
        report.closed,
        report.failures.len()
    );
    Ok(())
}
