// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Offline mixdown of a recorded take into a single audio file.

use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

use tracing::{debug, info, span, warn, Level};

use crate::audio::{OutputFormat, SampleFormat};
use crate::error::PadError;
use crate::events::{EventLog, PadId};
use crate::samples::{AssetProvider, AudioBuffer};
use crate::util::duration_minutes_seconds;

/// Silence rendered after the last hit.
pub const DEFAULT_TAIL_MS: u64 = 1000;

/// The longest take, tail included, that will be rendered.
pub const MAX_RENDER_MS: u64 = 60 * 60 * 1000;

/// A silent buffer that pad samples are mixed into.
struct MixCanvas {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl MixCanvas {
    /// Allocates silence for the given duration. Fails instead of aborting when the
    /// buffer can't be allocated.
    fn silent(duration_ms: u64, sample_rate: u32, channels: u16) -> Result<MixCanvas, PadError> {
        let len = frames_for(duration_ms, sample_rate)
            .checked_mul(channels as usize)
            .ok_or_else(|| PadError::InvalidTake(format!("{}ms is too long", duration_ms)))?;

        let mut samples: Vec<f32> = Vec::new();
        samples.try_reserve_exact(len).map_err(|e| {
            PadError::InvalidTake(format!("unable to allocate {}ms of audio: {}", duration_ms, e))
        })?;
        samples.resize(len, 0.0);

        Ok(MixCanvas {
            samples,
            channels,
            sample_rate,
        })
    }

    fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Adds the sample into the canvas starting at the offset, clipping every result to
    /// [-1.0, 1.0]. Anything past the end of the canvas is dropped. Returns the number of
    /// frames that didn't fit.
    fn overlay(&mut self, sample: &AudioBuffer, offset_ms: u64) -> usize {
        let start = frames_for(offset_ms, self.sample_rate).saturating_mul(self.channels as usize);
        if start >= self.samples.len() {
            return sample.frames();
        }

        let source = sample.samples();
        let target = &mut self.samples[start..];
        let overlap = target.len().min(source.len());
        for (dst, src) in target[..overlap].iter_mut().zip(&source[..overlap]) {
            *dst = (*dst + *src).clamp(-1.0, 1.0);
        }

        (source.len() - overlap) / self.channels as usize
    }

    fn into_buffer(self) -> AudioBuffer {
        AudioBuffer::new(self.samples, self.channels, self.sample_rate)
    }
}

/// Converts milliseconds to a frame count at the given rate, saturating on overflow.
fn frames_for(duration_ms: u64, sample_rate: u32) -> usize {
    let frames = duration_ms as u128 * sample_rate as u128 / 1000;
    usize::try_from(frames).unwrap_or(usize::MAX)
}

/// Renders takes into a single buffer and writes them out as WAV files.
pub struct Renderer {
    format: OutputFormat,
}

impl Renderer {
    pub fn new(format: OutputFormat) -> Renderer {
        Renderer { format }
    }

    pub fn format(&self) -> &OutputFormat {
        &self.format
    }

    /// Mixes every event of the log into one buffer `last offset + tail_ms` long.
    ///
    /// The canvas length comes only from the last hit and the tail. A sample that rings
    /// past the end of the canvas is cut off there.
    pub fn render(
        &self,
        log: &EventLog,
        provider: &dyn AssetProvider,
        tail_ms: u64,
    ) -> Result<AudioBuffer, PadError> {
        let span = span!(Level::INFO, "render");
        let _enter = span.enter();

        let last = log.last().ok_or(PadError::EmptyRecording)?;
        let total_ms = last
            .offset_ms
            .checked_add(tail_ms)
            .filter(|total_ms| *total_ms <= MAX_RENDER_MS)
            .ok_or_else(|| {
                PadError::InvalidTake(format!(
                    "last hit at {}ms plus a {}ms tail exceeds the {}ms render limit",
                    last.offset_ms, tail_ms, MAX_RENDER_MS
                ))
            })?;

        // Resolve and convert every pad up front so a missing sample fails the render
        // before any mixing happens.
        let mut pads: HashMap<PadId, AudioBuffer> = HashMap::new();
        for event in log.iter() {
            if pads.contains_key(&event.pad) {
                continue;
            }
            let sample = provider.load(event.pad).map_err(|e| {
                warn!(pad = event.pad.0, err = e.to_string(), "Sample unavailable for render");
                PadError::MissingAsset(event.pad)
            })?;
            pads.insert(
                event.pad,
                sample.conform(self.format.sample_rate, self.format.channels),
            );
        }

        let mut canvas =
            MixCanvas::silent(total_ms, self.format.sample_rate, self.format.channels)?;
        let mut truncated = 0;
        for event in log.iter() {
            if let Some(sample) = pads.get(&event.pad) {
                let dropped = canvas.overlay(sample, event.offset_ms);
                if dropped > 0 {
                    debug!(
                        pad = event.pad.0,
                        offset_ms = event.offset_ms,
                        dropped_frames = dropped,
                        "Hit truncated by end of take"
                    );
                    truncated += 1;
                }
            }
        }

        info!(
            events = log.len(),
            frames = canvas.frames(),
            truncated,
            "Rendered take"
        );

        Ok(canvas.into_buffer())
    }

    /// Writes the buffer to a new WAV file in the given directory, creating the directory if
    /// needed. The file is named after the current time; an existing file is never
    /// overwritten.
    pub fn export(&self, buffer: AudioBuffer, dir: &Path) -> Result<PathBuf, PadError> {
        let span = span!(Level::INFO, "export");
        let _enter = span.enter();

        fs::create_dir_all(dir)?;
        let (path, file) = create_unique(dir)?;

        let buffer = buffer.conform(self.format.sample_rate, self.format.channels);
        let mut writer = hound::WavWriter::new(BufWriter::new(file), self.format.wav_spec())?;
        match self.format.sample_format {
            SampleFormat::Float => {
                for sample in buffer.samples() {
                    writer.write_sample(sample.clamp(-1.0, 1.0))?;
                }
            }
            SampleFormat::Int => {
                let max = ((1i64 << (self.format.bits_per_sample - 1)) - 1) as f64;
                for sample in buffer.samples() {
                    let scaled = (sample.clamp(-1.0, 1.0) as f64 * max).round() as i32;
                    writer.write_sample(scaled)?;
                }
            }
        }
        writer.finalize()?;

        info!(
            path = ?path,
            duration = duration_minutes_seconds(buffer.duration()),
            "Exported take"
        );
        Ok(path)
    }
}

/// Creates a new file named after the current local time, adding a numeric suffix when
/// a file with that name already exists.
fn create_unique(dir: &Path) -> Result<(PathBuf, File), PadError> {
    let stem = chrono::Local::now()
        .format("take-%Y%m%d-%H%M%S-%3f")
        .to_string();

    for attempt in 0u32.. {
        let name = match attempt {
            0 => format!("{}.wav", stem),
            n => format!("{}-{}.wav", stem, n),
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(io::Error::new(io::ErrorKind::AlreadyExists, "no free file name").into())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::events::BeatEvent;
    use crate::samples::PadBank;
    use crate::testutil::calculate_rms;

    const RATE: u32 = 1000;

    /// One frame per millisecond keeps the arithmetic in these tests readable.
    fn renderer() -> Renderer {
        Renderer::new(OutputFormat::new(RATE, 1, SampleFormat::Float, 32).expect("format"))
    }

    fn tone(ms: usize, level: f32) -> AudioBuffer {
        AudioBuffer::new(vec![level; ms], 1, RATE)
    }

    fn log(events: &[(u8, u64)]) -> EventLog {
        EventLog::from_events(
            events
                .iter()
                .map(|(pad, offset_ms)| BeatEvent::new(PadId(*pad), *offset_ms))
                .collect(),
        )
        .expect("invalid log")
    }

    #[test]
    fn test_render_places_hits() -> Result<(), PadError> {
        let bank = PadBank::from_buffers(vec![tone(200, 0.5), tone(200, 0.25)]).unwrap();
        let rendered = renderer().render(&log(&[(0, 0), (1, 500)]), &bank, DEFAULT_TAIL_MS)?;

        assert_eq!(1500, rendered.frames());
        assert_eq!(std::time::Duration::from_millis(1500), rendered.duration());

        let samples = rendered.samples();
        assert!(samples[0..200].iter().all(|s| *s == 0.5));
        assert!(samples[500..700].iter().all(|s| *s == 0.25));
        assert_eq!(0.0, calculate_rms(&samples[200..500]));
        assert_eq!(0.0, calculate_rms(&samples[700..1500]));
        Ok(())
    }

    #[test]
    fn test_render_empty_log() {
        let bank = PadBank::from_buffers(vec![tone(200, 0.5)]).unwrap();
        assert!(matches!(
            renderer().render(&EventLog::empty(), &bank, DEFAULT_TAIL_MS),
            Err(PadError::EmptyRecording)
        ));
    }

    #[test]
    fn test_render_rejects_oversized_offsets() {
        let bank = PadBank::from_buffers(vec![tone(200, 0.5)]).unwrap();
        let huge = log(&[(0, 0), (0, 10_000_000_000_000_000)]);
        assert!(matches!(
            renderer().render(&huge, &bank, DEFAULT_TAIL_MS),
            Err(PadError::InvalidTake(_))
        ));
        assert!(matches!(
            renderer().render(&log(&[(0, u64::MAX - 10)]), &bank, DEFAULT_TAIL_MS),
            Err(PadError::InvalidTake(_))
        ));
        assert!(matches!(
            renderer().render(&log(&[(0, MAX_RENDER_MS)]), &bank, 1),
            Err(PadError::InvalidTake(_))
        ));
    }

    #[test]
    fn test_render_at_limit() -> Result<(), PadError> {
        let bank = PadBank::from_buffers(vec![tone(10, 0.5)]).unwrap();
        let rendered = renderer().render(&log(&[(0, MAX_RENDER_MS - 10)]), &bank, 10)?;
        assert_eq!(frames_for(MAX_RENDER_MS, RATE), rendered.frames());
        Ok(())
    }

    #[test]
    fn test_render_missing_asset() {
        let bank = PadBank::from_buffers(vec![tone(200, 0.5)]).unwrap();
        assert!(matches!(
            renderer().render(&log(&[(0, 0), (3, 10)]), &bank, DEFAULT_TAIL_MS),
            Err(PadError::MissingAsset(PadId(3)))
        ));
    }

    #[test]
    fn test_overlapping_hits_sum_and_clip() -> Result<(), PadError> {
        let bank = PadBank::from_buffers(vec![tone(100, 0.75)]).unwrap();
        let rendered = renderer().render(&log(&[(0, 0), (0, 10)]), &bank, DEFAULT_TAIL_MS)?;
        let samples = rendered.samples();

        // First hit alone, then both hits summed and clipped, then the second hit alone.
        assert!(samples[0..10].iter().all(|s| *s == 0.75));
        assert!(samples[10..100].iter().all(|s| *s == 1.0));
        assert!(samples[100..110].iter().all(|s| *s == 0.75));
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        Ok(())
    }

    #[test]
    fn test_negative_overlap_clips() -> Result<(), PadError> {
        let bank = PadBank::from_buffers(vec![tone(50, -0.6)]).unwrap();
        let rendered = renderer().render(&log(&[(0, 0), (0, 0)]), &bank, 0)?;
        assert!(rendered.samples().iter().all(|s| *s == -1.0));
        Ok(())
    }

    #[test]
    fn test_long_sample_is_truncated_at_tail() -> Result<(), PadError> {
        let bank = PadBank::from_buffers(vec![tone(2000, 0.5)]).unwrap();
        let rendered = renderer().render(&log(&[(0, 100)]), &bank, 300)?;

        assert_eq!(400, rendered.frames());
        assert!(rendered.samples()[100..400].iter().all(|s| *s == 0.5));
        Ok(())
    }

    #[test]
    fn test_render_conforms_samples() -> Result<(), PadError> {
        let format = OutputFormat::new(RATE, 2, SampleFormat::Float, 32).expect("format");
        let renderer = Renderer::new(format);
        let bank = PadBank::from_buffers(vec![tone(10, 0.5)]).unwrap();
        let rendered = renderer.render(&log(&[(0, 0)]), &bank, 10)?;

        assert_eq!(2, rendered.channel_count());
        assert_eq!(10, rendered.frames());
        assert!(rendered.samples()[0..20].iter().all(|s| *s == 0.5));
        Ok(())
    }

    #[test]
    fn test_export_writes_unique_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let recordings = dir.path().join("recordings");
        let renderer = Renderer::new(OutputFormat::new(44100, 2, SampleFormat::Int, 16)?);
        let buffer = AudioBuffer::new(vec![0.5, -0.5, 1.0, -1.0], 2, 44100);

        let first = renderer.export(buffer.clone(), &recordings)?;
        let second = renderer.export(buffer, &recordings)?;
        assert_ne!(first, second);
        assert!(first.starts_with(&recordings));

        let mut reader = hound::WavReader::open(&first)?;
        assert_eq!(2, reader.spec().channels);
        assert_eq!(16, reader.spec().bits_per_sample);
        let samples = reader.samples::<i16>().collect::<Result<Vec<i16>, _>>()?;
        assert_eq!(vec![16384, -16384, 32767, -32767], samples);
        Ok(())
    }
}
