use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapRb,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Sample rate the recognizer expects.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Samples per frame handed to the recognition loop (0.5 s at 16 kHz).
pub const FRAME_SAMPLES: usize = 8_000;

/// Average interleaved channels down to mono.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels_f64 = f64::from(channels);
    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            // audio samples are f32; the division cannot overflow it
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum / channels_f64) as f32
            }
        })
        .collect()
}

/// Linear-interpolation resampling between arbitrary rates. Good enough for
/// speech; playback speed control scales `src_rate` before calling this.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn resample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let output_len = ((samples.len() as f64) / ratio).ceil() as usize;

    let mut out = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_idx = (i as f64) * ratio;
        let floor = src_idx.floor() as usize;
        let ceil = (floor + 1).min(samples.len() - 1);
        let fract = src_idx - src_idx.floor();
        if floor >= samples.len() {
            out.push(0.0);
            continue;
        }
        let s1 = f64::from(samples[floor]);
        let s2 = f64::from(samples[ceil]);
        out.push(s1.mul_add(1.0 - fract, s2 * fract) as f32);
    }
    out
}

/// Running microphone capture. Dropping the handle (or setting the stop
/// flag) tears the capture and pump threads down.
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    // Held so the input stream stays alive.
    _stream: cpal::Stream,
}

impl CaptureHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open the default input device and start delivering 16 kHz mono frames of
/// [`FRAME_SAMPLES`] samples into `frames`. The cpal callback pushes raw
/// device samples into a lock-free ring buffer; a pump thread drains it,
/// downmixes, resamples, and batches. A full channel drops frames rather
/// than blocking the audio callback path.
pub fn start_capture(frames: SyncSender<Vec<f32>>) -> Result<CaptureHandle> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("no input device available")?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());

    let supported = device
        .default_input_config()
        .context("failed to get default input config")?;
    let device_rate = supported.sample_rate();
    let device_channels = supported.channels();
    info!(
        device = %device_name,
        rate = device_rate,
        channels = device_channels,
        "audio capture starting"
    );

    // Two seconds of headroom at the device rate.
    let capacity = (device_rate as usize) * (device_channels as usize) * 2;
    let (mut producer, mut consumer) = HeapRb::<f32>::new(capacity).split();

    let stream = device
        .build_input_stream(
            &supported.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let pushed = producer.push_slice(data);
                if pushed < data.len() {
                    warn!(dropped = data.len() - pushed, "capture ring buffer full");
                }
            },
            |err| warn!(error = %err, "audio input stream error"),
            None,
        )
        .context("failed to build input stream")?;
    stream.play().context("failed to start input stream")?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_pump = Arc::clone(&stop);
    thread::spawn(move || {
        let mut raw = Vec::new();
        let mut pending: Vec<f32> = Vec::new();
        while !stop_pump.load(Ordering::Relaxed) {
            raw.clear();
            while let Some(sample) = consumer.try_pop() {
                raw.push(sample);
            }
            if raw.is_empty() {
                thread::sleep(Duration::from_millis(20));
                continue;
            }
            let mono = downmix(&raw, device_channels);
            pending.extend(resample_linear(&mono, device_rate, TARGET_SAMPLE_RATE));
            while pending.len() >= FRAME_SAMPLES {
                let frame: Vec<f32> = pending.drain(..FRAME_SAMPLES).collect();
                if frames.try_send(frame).is_err() {
                    warn!("frame channel full, dropping audio");
                }
            }
        }
    });

    Ok(CaptureHandle {
        stop,
        _stream: stream,
    })
}

/// Blocking playback through the default output device.
pub struct CpalSink;

impl CpalSink {
    /// Play a mono clip declared at `sample_rate`, resampling to the device
    /// rate. Blocks until the clip has drained.
    pub fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no output device available")?;
        let supported = device
            .default_output_config()
            .context("failed to get default output config")?;
        let device_rate = supported.sample_rate();
        let channels = supported.channels() as usize;

        let clip = resample_linear(samples, sample_rate, device_rate);
        let total = clip.len();
        let mut pos = 0_usize;
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        let stream = device
            .build_output_stream(
                &supported.into(),
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in out.chunks_mut(channels) {
                        let sample = if pos < total {
                            let s = clip[pos];
                            pos += 1;
                            s
                        } else {
                            0.0
                        };
                        for slot in frame {
                            *slot = sample;
                        }
                    }
                    if pos >= total {
                        let _ = done_tx.send(());
                    }
                },
                |err| warn!(error = %err, "audio output stream error"),
                None,
            )
            .context("failed to build output stream")?;
        stream.play().context("failed to start output stream")?;

        // Wait for the callback to run dry, then a little extra so the tail
        // is not clipped by stream teardown.
        let clip_secs = f64::from(u32::try_from(total).unwrap_or(u32::MAX))
            / f64::from(device_rate);
        let timeout = Duration::from_secs_f64(clip_secs + 2.0);
        let _ = done_rx.recv_timeout(timeout);
        thread::sleep(Duration::from_millis(100));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let stereo = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(downmix(&stereo, 2), vec![1.5, 3.5, 5.5]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let mono = vec![1.0, 2.0, 3.0];
        assert_eq!(downmix(&mono, 1), mono);
    }

    #[test]
    fn test_downmix_four_channels() {
        let quad = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        assert_eq!(downmix(&quad, 4), vec![2.5, 6.5]);
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn test_resample_halves_count_on_2x_downsample() {
        let samples = vec![0.0; 20];
        let out = resample_linear(&samples, 32_000, 16_000);
        assert!((out.len() as i64 - 10).abs() <= 1);
    }

    #[test]
    fn test_resample_doubles_count_on_2x_upsample() {
        let samples = vec![0.0; 10];
        let out = resample_linear(&samples, 8_000, 16_000);
        assert!((out.len() as i64 - 20).abs() <= 1);
    }

    #[test]
    fn test_resample_preserves_bounds() {
        let samples = vec![-1.0, -0.5, 0.0, 0.5, 1.0];
        for &s in &resample_linear(&samples, 22_050, 16_000) {
            assert!((-1.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample_linear(&[], 48_000, 16_000).is_empty());
    }

    #[test]
    fn test_speed_scaling_shortens_output() {
        // Playing a clip with its declared rate scaled up by 1.5 should
        // yield proportionally fewer device samples, i.e. faster speech.
        let samples = vec![0.0; 300];
        let normal = resample_linear(&samples, 22_050, 48_000).len();
        let fast = resample_linear(&samples, (22_050_f64 * 1.5) as u32, 48_000).len();
        assert!(fast < normal);
    }
}
