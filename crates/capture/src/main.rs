//! `kneeflex-capture` -- measure a knee angle from a photo.
//!
//! Sends the photo to the hosted estimation backend, prints the result as
//! JSON and optionally appends the measurement to a local history file.
//! Ctrl-C abandons an in-flight estimate without reporting anything.
//!
//! # Usage
//!
//! ```text
//! kneeflex-capture <photo>
//! ```
//!
//! # Environment variables
//!
//! | Variable                  | Required | Default             | Description                        |
//! |---------------------------|----------|---------------------|------------------------------------|
//! | `ESTIMATION_API_URL`      | yes      | --                  | Base URL of the callable function  |
//! | `ESTIMATION_FUNCTION`     | no       | `estimateKneeAngle` | Function name                      |
//! | `ESTIMATION_ID_TOKEN`     | no       | --                  | Bearer identity token              |
//! | `ESTIMATION_TIMEOUT_SECS` | no       | `120`               | Request timeout                    |
//! | `IMAGE_MAX_DIMENSION`     | no       | `1024`              | Longest side after downscaling     |
//! | `IMAGE_JPEG_QUALITY`      | no       | `80`                | JPEG re-encode quality             |
//! | `DEFAULT_CONFIDENCE`      | no       | `0.8`               | Used when the backend omits one    |
//! | `INJURED_SIDE`            | no       | --                  | `left` or `right`                  |
//! | `INJURY_CONTEXT`          | no       | --                  | Injury tag, e.g. `acl_reconstruction` |
//! | `MEASUREMENT_KIND`        | no       | `flexion`           | `flexion` or `extension`           |
//! | `SURGERY_DATE`            | no       | --                  | `YYYY-MM-DD`, stamps post-op week  |
//! | `MEASUREMENTS_PATH`       | no       | --                  | JSON-lines history file            |

use std::path::PathBuf;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kneeflex_capture::config::CaptureConfig;
use kneeflex_capture::session::capture;
use kneeflex_capture::store::JsonlMeasurementStore;
use kneeflex_core::measurement::MeasurementStore;
use kneeflex_estimation::client::run_cancellable;
use kneeflex_estimation::config::EstimationConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kneeflex_capture=info,kneeflex_estimation=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let photo: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: kneeflex-capture <photo>")?;

    // --- Configuration ---
    let estimation = EstimationConfig::from_env().context("invalid estimation configuration")?;
    let capture_config = CaptureConfig::from_env().context("invalid capture configuration")?;
    tracing::info!(
        api_url = %estimation.api_url,
        function = %estimation.function_name,
        kind = capture_config.measurement_kind.as_str(),
        "Loaded configuration",
    );

    // No pose model ships with the CLI, so estimation is network-only.
    let estimator = estimation.build_estimator(None)?;
    let store = capture_config
        .measurements_path
        .as_ref()
        .map(JsonlMeasurementStore::new);

    // --- Cancellation ---
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let outcome = run_cancellable(
        capture(
            &estimator,
            store.as_ref().map(|s| s as &dyn MeasurementStore),
            &photo,
            &capture_config,
            chrono::Utc::now(),
        ),
        &cancel,
    )
    .await;

    match outcome {
        None => {
            tracing::info!("Capture cancelled");
            Ok(())
        }
        Some(Ok(report)) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Some(Err(err)) => {
            tracing::error!(kind = err.kind().code(), error = %err, "Capture failed");
            eprintln!("{}", err.user_message());
            std::process::exit(1);
        }
    }
}
