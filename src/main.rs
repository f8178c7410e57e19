use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use labelscan::capture::qr::{CodeDecoder, RqrrDecoder};
use labelscan::{
    CaptureConfig, CaptureController, CaptureMode, CaptureState, FieldExtractor, FrameSource, Msg,
    Playback, RecognitionEngine,
};

/// Give up on a live session after this long
const SESSION_TIMEOUT: Duration = Duration::from_secs(120);
/// How long to wait for the first preview frame before capturing
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "labelscan")]
#[command(about = "Read a product name from a label photo, or a QR code")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the product name from a label image
    #[command(alias = "label")]
    Ocr { image: PathBuf },
    /// Decode a QR code from an image
    #[command(alias = "code")]
    Qr { image: PathBuf },
    /// Capture from the live camera
    Camera {
        #[arg(value_enum)]
        mode: Mode,
    },
    /// Choose an image with the file dialog
    Pick {
        #[arg(value_enum)]
        mode: Mode,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    #[value(alias = "label")]
    Ocr,
    #[value(alias = "code")]
    Qr,
}

impl From<Mode> for CaptureMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Ocr => CaptureMode::Ocr,
            Mode::Qr => CaptureMode::Qr,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version are not usage errors
            return Ok(if err.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            });
        }
    };
    let config = CaptureConfig::load();

    let value = match cli.command {
        Command::Ocr { image } => recognize_file(CaptureMode::Ocr, image, &config).await?,
        Command::Qr { image } => recognize_file(CaptureMode::Qr, image, &config).await?,
        Command::Pick { mode } => match FrameSource::pick_file().await {
            Some(path) => recognize_file(mode.into(), path, &config).await?,
            None => {
                eprintln!("No image chosen");
                None
            }
        },
        Command::Camera { mode } => run_camera(mode.into(), &config).await?,
    };

    Ok(match value {
        Some(value) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        None => ExitCode::from(1),
    })
}

/// One-shot recognition of an image file
async fn recognize_file(
    mode: CaptureMode,
    path: PathBuf,
    config: &CaptureConfig,
) -> anyhow::Result<Option<String>> {
    let still = match FrameSource::from_file(&path).await {
        Ok(still) => still,
        Err(err) => {
            eprintln!("{}", err.user_message());
            log::error!("Failed to load {}: {}", path.display(), err);
            return Ok(None);
        }
    };

    match mode {
        CaptureMode::Ocr => {
            let engine = RecognitionEngine::from_config(config);
            let text = engine
                .recognize_text(still, |p| log::info!("OCR progress {}%", p))
                .await
                .with_context(|| format!("OCR failed on {}", path.display()))?;
            let extractor = FieldExtractor::with_keywords(config.keywords.iter().cloned());
            let field = extractor.extract(&text);
            if field.found {
                Ok(Some(field.value))
            } else {
                eprintln!("No product name found. Recognized text:\n{}", text);
                Ok(None)
            }
        }
        CaptureMode::Qr => {
            let decoder = RqrrDecoder::new(&config.qr);
            let found = tokio::task::spawn_blocking(move || decoder.decode(&still.rgba))
                .await
                .context("QR decoding task failed")?;
            if found.is_empty() {
                eprintln!("No QR code found in {}", path.display());
            }
            Ok(found.into_iter().next())
        }
    }
}

/// Drive a live camera session to completion
async fn run_camera(mode: CaptureMode, config: &CaptureConfig) -> anyhow::Result<Option<String>> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let mut controller = CaptureController::from_config(mode, config, move |value| {
        let _ = tx.send(value);
    });

    let finished = tokio::time::timeout(SESSION_TIMEOUT, drive(&mut controller)).await;
    if finished.is_err() {
        eprintln!("Timed out after {}s", SESSION_TIMEOUT.as_secs());
    }
    if let Some(message) = controller.state().error_message() {
        eprintln!("{}", message);
    }
    if let Some(raw_text) = controller.state().raw_text()
        && !matches!(controller.state(), CaptureState::ResultReady { .. })
    {
        eprintln!("No product name found. Recognized text:\n{}", raw_text);
    }
    controller.close();
    Ok(rx.await.ok())
}

async fn drive(controller: &mut CaptureController) {
    controller.open();
    if controller.mode() == CaptureMode::Ocr {
        controller.update(Msg::choose_camera());
    }
    controller
        .wait_for(|s| !matches!(s, CaptureState::Requesting))
        .await;

    if controller.state()
        == &(CaptureState::Streaming {
            playback: Playback::Blocked,
        })
    {
        controller.update(Msg::StartPlayback);
    }

    match controller.mode() {
        CaptureMode::Qr => {
            eprintln!("Point the camera at a QR code");
            controller
                .wait_for(|s| s.is_closed() || matches!(s, CaptureState::Error { .. }))
                .await;
        }
        CaptureMode::Ocr => {
            let waited = tokio::time::timeout(FIRST_FRAME_TIMEOUT, async {
                while matches!(controller.state(), CaptureState::Streaming { .. })
                    && !controller.can_capture()
                {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            })
            .await;
            if waited.is_err() {
                log::warn!("No preview frame within {}s", FIRST_FRAME_TIMEOUT.as_secs());
                return;
            }
            controller.update(Msg::capture());
            controller
                .wait_for(|s| {
                    matches!(
                        s,
                        CaptureState::ResultReady { .. }
                            | CaptureState::NoMatch { .. }
                            | CaptureState::Error { .. }
                    )
                })
                .await;
            if matches!(controller.state(), CaptureState::ResultReady { .. }) {
                controller.update(Msg::apply());
            }
        }
    }
}
