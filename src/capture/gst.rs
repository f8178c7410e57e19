//! GStreamer camera backend
//!
//! Builds `source ! capsfilter ! videoconvert ! appsink` and copies every
//! decoded RGBA frame onto the attached display surface.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbaImage;
use std::sync::{Arc, Mutex};

use crate::capture::camera::{CameraBackend, DeviceStream, DisplaySurface};
use crate::config::{CameraConstraints, Facing};
use crate::domain::Playback;
use crate::error::{CaptureError, Result};

/// How long `play` waits for the pipeline to reach PLAYING
const PLAY_TIMEOUT_SECS: u64 = 5;

/// Map a GStreamer resource error onto the capture taxonomy
pub fn classify_resource_error(kind: Option<gst::ResourceError>, detail: String) -> CaptureError {
    match kind {
        Some(gst::ResourceError::NotAuthorized)
        | Some(gst::ResourceError::OpenRead)
        | Some(gst::ResourceError::OpenReadWrite) => CaptureError::PermissionDenied { detail },
        Some(gst::ResourceError::Busy) => CaptureError::DeviceBusy { detail },
        _ => CaptureError::DeviceUnavailable { detail },
    }
}

/// Words in a device name that hint at which way it faces
fn facing_hints(facing: Facing) -> &'static [&'static str] {
    match facing {
        Facing::Rear => &["rear", "back", "environment", "world"],
        Facing::Front => &["front", "user", "face", "integrated"],
        Facing::Any => &[],
    }
}

/// Pick the device whose name best matches the facing preference, falling
/// back to the first one
pub fn choose_device(names: &[String], facing: Facing) -> Option<usize> {
    if names.is_empty() {
        return None;
    }
    let hints = facing_hints(facing);
    names
        .iter()
        .position(|name| {
            let name = name.to_lowercase();
            hints.iter().any(|hint| name.contains(hint))
        })
        .or(Some(0))
}

/// Caps in preference order: ideal size first, then anything at or above
/// the minimum
fn source_caps(constraints: &CameraConstraints) -> gst::Caps {
    let ideal = gst::Structure::builder("video/x-raw")
        .field("width", constraints.ideal_width as i32)
        .field("height", constraints.ideal_height as i32)
        .build();
    let fallback = gst::Structure::builder("video/x-raw")
        .field(
            "width",
            gst::IntRange::<i32>::new(constraints.min_width as i32, i32::MAX),
        )
        .field(
            "height",
            gst::IntRange::<i32>::new(constraints.min_height as i32, i32::MAX),
        )
        .build();
    gst::Caps::builder_full()
        .structure(ideal)
        .structure(fallback)
        .build()
}

/// Camera backend using the system's GStreamer video sources
#[derive(Debug, Default, Clone)]
pub struct GstCamera;

impl GstCamera {
    pub fn new() -> Self {
        Self
    }

    fn source_element(constraints: &CameraConstraints) -> Result<(gst::Element, String)> {
        if let Some(device) = &constraints.device {
            let element = gst::ElementFactory::make("v4l2src")
                .property("device", device.as_str())
                .build()
                .map_err(|e| CaptureError::DeviceUnavailable {
                    detail: format!("Failed to create v4l2src: {}", e),
                })?;
            return Ok((element, device.clone()));
        }

        let monitor = gst::DeviceMonitor::new();
        let _ = monitor.add_filter(Some("Video/Source"), None);
        monitor
            .start()
            .map_err(|e| CaptureError::DeviceUnavailable {
                detail: format!("Failed to start device monitor: {}", e),
            })?;
        let devices: Vec<gst::Device> = monitor.devices().into_iter().collect();
        monitor.stop();

        let names: Vec<String> = devices.iter().map(|d| d.display_name().to_string()).collect();
        log::info!("Available cameras: {:?}", names);

        let index = choose_device(&names, constraints.facing).ok_or_else(|| {
            CaptureError::DeviceUnavailable {
                detail: "no video source devices".to_string(),
            }
        })?;
        let element = devices[index]
            .create_element(None)
            .map_err(|e| CaptureError::DeviceUnavailable {
                detail: format!("Failed to create source for {}: {}", names[index], e),
            })?;
        Ok((element, names[index].clone()))
    }
}

impl CameraBackend for GstCamera {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn DeviceStream>> {
        gst::init().map_err(|e| CaptureError::DeviceUnavailable {
            detail: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let (source, label) = Self::source_element(constraints)?;
        let make = |name: &str| {
            gst::ElementFactory::make(name)
                .build()
                .map_err(|e| CaptureError::DeviceUnavailable {
                    detail: format!("Failed to create {}: {}", name, e),
                })
        };
        let capsfilter = make("capsfilter")?;
        capsfilter.set_property("caps", source_caps(constraints));
        let videoconvert = make("videoconvert")?;

        let appsink = gst_app::AppSink::builder()
            .name("camera-sink")
            .caps(
                &gst::Caps::builder("video/x-raw")
                    .field("format", "RGBA")
                    .build(),
            )
            .max_buffers(1)
            .drop(true)
            .sync(false)
            .build();

        let pipeline = gst::Pipeline::new();
        let unavailable = |e: gst::glib::BoolError| CaptureError::DeviceUnavailable {
            detail: format!("Failed to assemble camera pipeline: {}", e),
        };
        pipeline
            .add_many([&source, &capsfilter, &videoconvert, appsink.upcast_ref()])
            .map_err(unavailable)?;
        gst::Element::link_many([&source, &capsfilter, &videoconvert, appsink.upcast_ref()])
            .map_err(unavailable)?;

        let target: Arc<Mutex<Option<DisplaySurface>>> = Arc::default();
        let callback_target = target.clone();
        let limits = constraints.clone();
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let frame = frame_from_sample(&sample).ok_or(gst::FlowError::Error)?;
                    if !limits.accepts(frame.width(), frame.height()) {
                        log::debug!(
                            "Dropping {}x{} frame below minimum",
                            frame.width(),
                            frame.height()
                        );
                        return Ok(gst::FlowSuccess::Ok);
                    }
                    let surface = callback_target.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(surface) = surface.as_ref() {
                        surface.present(frame);
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        let stream = GstStream {
            pipeline,
            target,
            label,
            live: true,
        };
        // READY opens the device node
        if stream.pipeline.set_state(gst::State::Ready).is_err() {
            let err = stream.bus_error();
            let mut stream = stream;
            stream.stop();
            return Err(err);
        }
        log::info!("Opened camera {}", stream.label);
        Ok(Box::new(stream))
    }
}

/// Copy an RGBA sample into a tightly packed image, honoring stride
fn frame_from_sample(sample: &gst::Sample) -> Option<RgbaImage> {
    let caps = sample.caps()?;
    let info = gst_video::VideoInfo::from_caps(caps).ok()?;
    let buffer = sample.buffer()?;
    let map = buffer.map_readable().ok()?;

    let (width, height) = (info.width(), info.height());
    let stride = info.stride()[0] as usize;
    let row_bytes = width as usize * 4;
    let data = map.as_slice();
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(data.get(start..start + row_bytes)?);
    }
    RgbaImage::from_raw(width, height, pixels)
}

#[derive(Debug)]
struct GstStream {
    pipeline: gst::Pipeline,
    target: Arc<Mutex<Option<DisplaySurface>>>,
    label: String,
    live: bool,
}

impl GstStream {
    /// Turn the first error on the bus into a capture error
    fn bus_error(&self) -> CaptureError {
        let message = self
            .pipeline
            .bus()
            .and_then(|bus| bus.pop_filtered(&[gst::MessageType::Error]));
        if let Some(message) = message
            && let gst::MessageView::Error(err) = message.view()
        {
            let detail = format!(
                "{}: {} ({})",
                self.label,
                err.error(),
                err.debug().unwrap_or_default()
            );
            return classify_resource_error(err.error().kind::<gst::ResourceError>(), detail);
        }
        CaptureError::DeviceUnavailable {
            detail: format!("{}: pipeline state change failed", self.label),
        }
    }
}

impl DeviceStream for GstStream {
    fn attach(&mut self, surface: DisplaySurface) {
        *self.target.lock().unwrap_or_else(|e| e.into_inner()) = Some(surface);
    }

    /// GStreamer never withholds playback for a user gesture, so this is
    /// either `Playing` or the device error that stopped the pipeline.
    fn play(&mut self) -> Result<Playback> {
        if !self.live {
            return Err(CaptureError::NotStreaming);
        }
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| self.bus_error())?;
        let (result, state, _) = self
            .pipeline
            .state(gst::ClockTime::from_seconds(PLAY_TIMEOUT_SECS));
        if result.is_err() || state != gst::State::Playing {
            return Err(self.bus_error());
        }
        log::debug!("Camera {} playing", self.label);
        Ok(Playback::Playing)
    }

    fn stop(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            log::error!("Failed to stop camera pipeline: {}", e);
        }
        *self.target.lock().unwrap_or_else(|e| e.into_inner()) = None;
        log::info!("Released camera {}", self.label);
    }

    fn active_tracks(&self) -> usize {
        usize::from(self.live)
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

impl Drop for GstStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_resource_errors_map_to_distinct_kinds() {
        let kind = |e| classify_resource_error(e, String::new()).kind();
        assert_eq!(kind(Some(gst::ResourceError::NotFound)), ErrorKind::DeviceUnavailable);
        assert_eq!(kind(Some(gst::ResourceError::NotAuthorized)), ErrorKind::PermissionDenied);
        assert_eq!(kind(Some(gst::ResourceError::OpenRead)), ErrorKind::PermissionDenied);
        assert_eq!(kind(Some(gst::ResourceError::Busy)), ErrorKind::DeviceBusy);
        assert_eq!(kind(None), ErrorKind::DeviceUnavailable);
    }

    #[test]
    fn test_choose_device_prefers_facing() {
        let names = vec![
            "Integrated Camera: Front".to_string(),
            "USB Rear Camera".to_string(),
        ];
        assert_eq!(choose_device(&names, Facing::Rear), Some(1));
        assert_eq!(choose_device(&names, Facing::Front), Some(0));
        assert_eq!(choose_device(&names, Facing::Any), Some(0));
        assert_eq!(choose_device(&["Webcam".to_string()], Facing::Rear), Some(0));
        assert_eq!(choose_device(&[], Facing::Rear), None);
    }

    #[test]
    fn test_find_camera() {
        // This test may find nothing on machines without a camera
        if gst::init().is_ok() {
            let result = GstCamera::new().open(&CameraConstraints {
                facing: Facing::Any,
                ..CameraConstraints::default()
            });
            if let Ok(mut stream) = result {
                assert_eq!(stream.active_tracks(), 1);
                stream.stop();
                assert_eq!(stream.active_tracks(), 0);
            }
        }
    }
}
