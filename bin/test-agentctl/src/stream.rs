//! ---
//! ta_section: "05-networking-external-interfaces"
//! ta_subsection: "binary"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Client CLI for operators and test harnesses driving the test agent."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{Context, Result};
use test_agent_common::model::{TraceEventType, TraceGroups, TraceSeverity};
use test_agent_common::time::nanos_to_rfc3339;
use test_agent_net::proto::{self, Empty};
use test_agent_net::AgentClient;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::warn;

use crate::commands;

/// Client-side limits; whichever is hit first ends the stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamLimits {
    pub max_events: usize,
    pub timeout: Duration,
}

/// Receive events and hand each to `on_event` with its 1-based sequence number.
/// Returning early drops the response stream, which cancels the call server-side.
async fn consume_events<F>(
    client: &mut AgentClient,
    limits: StreamLimits,
    mut on_event: F,
) -> Result<usize>
where
    F: FnMut(usize, &proto::TraceEvent),
{
    println!(
        "Streaming trace events (max: {}, timeout: {}s)...",
        limits.max_events,
        limits.timeout.as_secs()
    );
    let mut events = client
        .stream_trace(Empty {})
        .await
        .context("StreamTrace failed")?
        .into_inner();

    let deadline = sleep(limits.timeout);
    tokio::pin!(deadline);
    let mut count = 0;
    loop {
        if count >= limits.max_events {
            println!("Reached maximum events limit ({})", limits.max_events);
            break;
        }
        tokio::select! {
            _ = &mut deadline => {
                println!("Timeout reached ({}s)", limits.timeout.as_secs());
                break;
            }
            message = events.message() => {
                match message.context("trace stream interrupted")? {
                    Some(event) => {
                        count += 1;
                        on_event(count, &event);
                    }
                    None => break,
                }
            }
        }
    }
    println!("Received {count} trace events");
    Ok(count)
}

fn group_names(mask: u32) -> String {
    let names: Vec<_> = TraceGroups::from_bits_truncate(mask)
        .iter_names()
        .map(|(name, _)| name.to_ascii_lowercase())
        .collect();
    if names.is_empty() {
        "none".to_owned()
    } else {
        names.join("|")
    }
}

fn message_text(event: &proto::TraceEvent) -> String {
    if event.message.is_empty() {
        "No message".to_owned()
    } else {
        String::from_utf8_lossy(&event.message).into_owned()
    }
}

pub async fn print_events(client: &mut AgentClient, limits: StreamLimits) -> Result<usize> {
    consume_events(client, limits, |number, event| {
        println!("  Event {number}:");
        println!(
            "    Timestamp: {} ns ({})",
            event.timestamp_ns,
            nanos_to_rfc3339(event.timestamp_ns)
        );
        println!(
            "    Groups: {} ({})",
            event.groups_mask,
            group_names(event.groups_mask)
        );
        println!("    Severity: {}", TraceSeverity::from(event.severity()));
        println!("    Type: {}", TraceEventType::from(event.event_type()));
        println!("    Message: {}", message_text(event));
        println!();
    })
    .await
}

async fn poll_info(client: &AgentClient, poll: u64) {
    println!("\n[INFO POLL #{poll}] Checking server status...");
    let (mut mock, mut version, mut integration, mut model) =
        (client.clone(), client.clone(), client.clone(), client.clone());
    let results = tokio::join!(
        commands::mock_mode(&mut mock),
        commands::version(&mut version),
        commands::integration(&mut integration),
        commands::model_id(&mut model),
    );
    for (name, err) in [
        ("mock", results.0.err()),
        ("version", results.1.err()),
        ("integration", results.2.err()),
        ("model", results.3.err()),
    ] {
        if let Some(err) = err {
            warn!(query = name, error = %err, "info poll failed");
        }
    }
    println!("[INFO POLL #{poll}] Complete\n");
}

/// Stream trace events while polling the four info queries every `poll_interval`.
/// Ends when the stream closes, `duration` elapses, or the user interrupts.
pub async fn stream_while_polling(
    client: &AgentClient,
    duration: Duration,
    poll_interval: Duration,
) -> Result<()> {
    println!("Starting concurrent log streaming and server info polling...");
    println!("{}", "=".repeat(60));
    println!("Running for {} seconds...", duration.as_secs());

    let mut stream_client = client.clone();
    let limits = StreamLimits {
        max_events: usize::try_from(duration.as_secs().saturating_mul(2)).unwrap_or(usize::MAX),
        timeout: duration + Duration::from_secs(5),
    };
    let streamer = consume_events(&mut stream_client, limits, |number, event| {
        println!(
            "[LOG] Event {number}: {} - {}",
            TraceSeverity::from(event.severity()),
            message_text(event)
        );
    });

    let poller = async {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls = 0u64;
        loop {
            ticker.tick().await;
            polls += 1;
            poll_info(client, polls).await;
        }
    };

    tokio::select! {
        result = streamer => {
            result?;
        }
        _ = poller => {}
        _ = sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => println!("\nInterrupted by user"),
    }
    println!("\nConcurrent streaming and polling completed");
    Ok(())
}
