mod config;
mod logging;

use std::{process, sync::Arc, time::Duration};

use scan_core::{DecodeCandidate, PermissionStatus, ScanOutcome, SessionEvent, SessionState};
use scan_platform::{RecordingOverlay, ScanPlatform, ScriptedPermissionPrompt, SimulatedCamera};
use scan_session::ScanSessionController;
use tokio::{sync::broadcast::error::RecvError, time::timeout};
use tracing::{debug, error, info};

use crate::config::SmokeConfig;

const OUTCOME_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    logging::init();

    let config = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            process::exit(2);
        }
    };

    let camera = SimulatedCamera::new(config.engine);
    let platform = ScanPlatform::new(
        Arc::new(camera.clone()),
        Arc::new(ScriptedPermissionPrompt::always(PermissionStatus::Granted)),
        Arc::new(RecordingOverlay::default()),
    );
    let (controller, receiver) = ScanSessionController::new(config.scan.clone(), platform);

    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Resolved(_)) => break,
                Ok(event) => debug!(?event, "session event"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "session events lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    match controller.start().await {
        Ok(SessionState::Scanning) => match &config.payload {
            Some(payload) => {
                info!(native_type = %payload.native_type, "emitting simulated candidate");
                let delivered = camera.emit(vec![DecodeCandidate::new(
                    payload.raw_content.clone(),
                    payload.native_type.clone(),
                )]);
                if delivered == 0 {
                    info!("candidate filtered by format restriction; cancelling");
                    controller.cancel();
                }
            }
            None => {
                info!("no simulated payload configured; cancelling");
                controller.cancel();
            }
        },
        Ok(state) => info!(?state, "session did not reach scanning"),
        Err(err) => {
            error!(error = %err, "session failed to start");
            process::exit(1);
        }
    }

    let outcome = match timeout(OUTCOME_TIMEOUT, receiver.recv()).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            error!(error = %err, "session ended without an outcome");
            process::exit(1);
        }
        Err(_) => {
            error!("timed out waiting for the scan outcome");
            process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            eprintln!("Failed to encode outcome: {err}");
            process::exit(1);
        }
    }
    if matches!(outcome, ScanOutcome::Error { .. }) {
        process::exit(1);
    }
}
