/*! Local audio seam.

The OS audio backends proper are external collaborators; the engines
only see these two traits. With the `audio` feature a cpal-backed
output is available for headless monitoring; without it the null
implementations keep everything running silently.
*/
use crate::Result;

/// Local speaker sink for one receiver's audio.
pub trait AudioSink: Send + Sync {
    /// One stereo sample pair.
    fn write(&self, left: f32, right: f32);
}

/// Local microphone source for the transmitter.
pub trait MicSource: Send + Sync {
    /// Next mic sample, if the device has one ready.
    fn next_sample(&self) -> Option<f64>;
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn write(&self, _left: f32, _right: f32) {}
}

impl MicSource for NullAudio {
    fn next_sample(&self) -> Option<f64> {
        None
    }
}

#[cfg(feature = "audio")]
pub use cpal_audio::CpalSink;

#[cfg(feature = "audio")]
mod cpal_audio {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use log::{debug, error, info};
    use std::sync::mpsc::{SyncSender, sync_channel};

    /// Speaker output through the default cpal device.
    ///
    /// The cpal stream itself is not `Send`, so a dedicated thread
    /// owns it; this handle only holds the sample channel.
    pub struct CpalSink {
        sender: SyncSender<(f32, f32)>,
    }

    impl CpalSink {
        /// Open the default output device at the given rate.
        pub fn new(sample_rate: u32) -> Result<Self> {
            // One second of buffer between the DSP callback and the
            // sound card.
            let (sender, receiver) = sync_channel::<(f32, f32)>(sample_rate as usize);
            let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
            std::thread::Builder::new()
                .name("audio out".to_string())
                .spawn(move || {
                    let build = || -> Result<cpal::Stream> {
                        let host = cpal::default_host();
                        debug!("audio: chose default host {}", host.id().name());
                        let device = host.default_output_device().ok_or_else(|| {
                            crate::Error::transport("audio: failed to find output device")
                        })?;
                        info!("audio: output device: {}", device.name().unwrap_or_default());
                        let config = device
                            .default_output_config()
                            .map_err(|e| crate::Error::transport(format!("audio config: {e}")))?;
                        let mut config: cpal::StreamConfig = config.into();
                        config.sample_rate = cpal::SampleRate(sample_rate);
                        config.channels = 2;
                        let err_fn = |err| error!("audio: stream error: {err}");
                        let stream = device
                            .build_output_stream(
                                &config,
                                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                                    for frame in data.chunks_mut(2) {
                                        let (l, r) = receiver.try_recv().unwrap_or((0.0, 0.0));
                                        frame[0] = l;
                                        if frame.len() > 1 {
                                            frame[1] = r;
                                        }
                                    }
                                },
                                err_fn,
                                None,
                            )
                            .map_err(|e| crate::Error::transport(format!("audio stream: {e}")))?;
                        stream
                            .play()
                            .map_err(|e| crate::Error::transport(format!("audio play: {e}")))?;
                        Ok(stream)
                    };
                    match build() {
                        Ok(_stream) => {
                            let _ = ready_tx.send(Ok(()));
                            // Keep the stream alive for the process
                            // lifetime.
                            loop {
                                std::thread::park();
                            }
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                        }
                    }
                })?;
            ready_rx
                .recv()
                .map_err(|e| crate::Error::transport(format!("audio thread died: {e}")))??;
            Ok(Self { sender })
        }
    }

    impl AudioSink for CpalSink {
        fn write(&self, left: f32, right: f32) {
            // Drop on overrun; the sound card sets the pace.
            let _ = self.sender.try_send((left, right));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_audio_is_silent() {
        let a = NullAudio;
        a.write(0.5, -0.5);
        assert_eq!(a.next_sample(), None);
    }
}
/* vim: textwidth=80
 */
