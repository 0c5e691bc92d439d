//! Meeting Client
//!
//! Headless driver for the meeting lifecycle.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Create a meeting (`MEETING_RECIPIENT`) or open one (`MEETING_ID`)
//! 4. Validate it and optionally confirm `MEETING_SLOT`
//! 5. Log the countdown until the join window opens, then check that the
//!    relay accepts a connection
//! 6. Wait for shutdown signal

#![warn(clippy::pedantic)]

use anyhow::{bail, Context};
use meeting_client::clock::{Clock, SystemClock};
use meeting_client::config::Config;
use meeting_client::directory::{HttpDirectoryClient, MeetingDirectory};
use meeting_client::meeting::{create_meeting, Meeting};
use meeting_client::session::{MeetingSessionActor, SessionDeps, SessionSnapshot};
use meeting_client::signaling::{RelayConnector, WsRelayConnector};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    if let Err(e) = common::observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {e}");
    }

    info!(
        directory_url = %config.directory_url,
        relay_url = %config.relay_url,
        timezone = %config.timezone,
        trickle_ice = config.trickle_ice,
        "Configuration loaded successfully"
    );

    let directory: Arc<dyn MeetingDirectory> = Arc::new(
        HttpDirectoryClient::new(config.directory_url.clone(), config.directory_timeout())
            .context("Failed to build directory client")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let meeting = if let Some(recipient) = &config.recipient {
        let created = create_meeting(
            Arc::clone(&directory),
            recipient,
            clock.now(),
            config.send_invites,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        info!(
            meeting_id = %created.meeting.id,
            meeting_link = %created.meeting_link,
            invite_link = %created.invite_link,
            "Meeting created"
        );
        created.meeting
    } else if let Some(meeting_id) = config.meeting_id.clone() {
        Meeting::opened(meeting_id)
    } else {
        bail!("Set MEETING_RECIPIENT to create a meeting or MEETING_ID to open one");
    };

    let deps = SessionDeps {
        directory,
        clock,
        timezone: config.timezone,
        tick: config.countdown_tick(),
    };
    let shutdown_token = CancellationToken::new();
    let (session, session_task) =
        MeetingSessionActor::spawn(meeting, deps, shutdown_token.child_token());

    if let Err(e) = session.validate().await {
        error!(error = %e, "Meeting validation failed");
        shutdown_token.cancel();
        let _ = session_task.await;
        bail!(e.user_message());
    }

    if let Some(slot) = &config.slot {
        match session.select_slot(slot).await {
            Ok(snapshot) => info!(
                slot = %slot,
                countdown_secs = snapshot.countdown_secs,
                "Slot confirmed"
            ),
            Err(e) => warn!(slot = %slot, error = %e, "{}", e.user_message()),
        }
    }

    let progress = tokio::spawn(log_progress(
        session.subscribe(),
        config.relay_connector(),
    ));

    shutdown_signal().await;
    info!("Shutdown signal received, leaving meeting...");

    session.cancel_timer().await;
    shutdown_token.cancel();
    progress.abort();
    if let Err(e) = session_task.await {
        error!(error = %e, "Session task failed");
    }

    info!("Meeting client shutdown complete");
    Ok(())
}

/// Log each countdown change until the join window opens.
async fn log_progress(mut snapshots: watch::Receiver<SessionSnapshot>, relay: WsRelayConnector) {
    let mut last = None;
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        if snapshot.can_join {
            info!(meeting_id = %snapshot.meeting_id, "Join window is open");
            check_relay(&relay).await;
            break;
        }
        if snapshot.state.is_expired() {
            warn!(meeting_id = %snapshot.meeting_id, "Meeting expired");
            break;
        }
        if snapshot.timer_active && last != Some(snapshot.countdown_secs) {
            info!(
                countdown_secs = snapshot.countdown_secs,
                seconds_until_slot = snapshot.seconds_until_slot,
                "Waiting for join window"
            );
            last = Some(snapshot.countdown_secs);
        }
        if snapshots.changed().await.is_err() {
            break;
        }
    }
}

/// Connect once and disconnect, reporting whether a call could be placed.
async fn check_relay(relay: &WsRelayConnector) {
    match relay.connect().await {
        Ok(mut channel) => {
            info!(peer_id = %channel.peer_id(), "Relay reachable");
            channel.close().await;
        }
        Err(e) => warn!(error = %e, "Relay unreachable, joining would fail"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
