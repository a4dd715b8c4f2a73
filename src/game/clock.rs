use std::sync::Arc;

use crate::core::audio::{AudioEngine, AudioError, ChannelHandle};
use crate::game::song::SongData;
use crate::game::timing::TimingMap;

/// Where the song is at one instant, derived from the audio position.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClockReading {
    /// Milliseconds into the audio file.
    pub audio_ms: f64,
    /// Milliseconds since phrase 0; negative during the lead-in.
    pub song_ms: f64,
    pub phrase: f64,
    pub bpm: f64,
    pub stopped: bool,
}

/// Maps audio file positions onto the song's phrase grid.
#[derive(Clone, Debug)]
pub struct SongClock {
    timing: Arc<TimingMap>,
    offset_ms: f64,
    audio_start_ms: f64,
    end_ms: f64,
}

impl SongClock {
    pub fn new(song: &SongData) -> Self {
        Self::with_timing(Arc::new(song.timing_map()), song.offset, song.audio_start, song.length)
    }

    /// `offset`, `audio_start` and `length` in seconds, as a song carries them.
    pub fn with_timing(timing: Arc<TimingMap>, offset: f64, audio_start: f64, length: f64) -> Self {
        Self {
            timing,
            offset_ms: offset * 1000.0,
            audio_start_ms: audio_start.max(0.0) * 1000.0,
            end_ms: length * 1000.0,
        }
    }

    pub fn timing(&self) -> &Arc<TimingMap> {
        &self.timing
    }

    /// Audio position playback should be started from.
    pub const fn start_position_ms(&self) -> f64 {
        self.audio_start_ms
    }

    #[inline(always)]
    pub fn song_ms(&self, audio_ms: f64) -> f64 {
        audio_ms - self.offset_ms
    }

    /// Inverse of [`Self::song_ms`].
    #[inline(always)]
    pub fn audio_ms(&self, song_ms: f64) -> f64 {
        song_ms + self.offset_ms
    }

    pub fn reading(&self, audio_ms: f64) -> ClockReading {
        let song_ms = self.song_ms(audio_ms);
        ClockReading {
            audio_ms,
            song_ms,
            phrase: self.timing.ms_to_phrase(song_ms),
            bpm: self.timing.bpm_at_ms(song_ms),
            stopped: self.timing.is_stopped_at_ms(song_ms),
        }
    }

    /// Reads the channel's position from the engine and converts it.
    pub fn poll(&self, engine: &dyn AudioEngine, channel: ChannelHandle) -> Result<ClockReading, AudioError> {
        engine.position(channel).map(|ms| self.reading(ms))
    }

    /// True once the audio has played past the song's length.
    pub fn is_finished(&self, audio_ms: f64) -> bool {
        audio_ms >= self.end_ms
    }

    /// Song time at which play ends.
    pub fn end_song_ms(&self) -> f64 {
        self.song_ms(self.end_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::SilentAudio;

    fn clock() -> SongClock {
        // Phrase 0 lands 1.5 s into the audio; stop of 2 beats at phrase 1.
        let timing = Arc::new(TimingMap::new(&[(0.0, 120.0)], &[(1.0, 2.0)]));
        SongClock::with_timing(timing, 1.5, 0.25, 30.0)
    }

    #[test]
    fn audio_positions_map_through_the_offset() {
        let clock = clock();
        let lead_in = clock.reading(500.0);
        assert!((lead_in.song_ms + 1000.0).abs() < 1e-9);
        assert!(lead_in.phrase < 0.0);

        let at_zero = clock.reading(1500.0);
        assert!(at_zero.phrase.abs() < 1e-9);
        assert!((at_zero.bpm - 120.0).abs() < 1e-9);
        assert!((clock.audio_ms(at_zero.song_ms) - 1500.0).abs() < 1e-9);
        assert!((clock.start_position_ms() - 250.0).abs() < 1e-9);
    }

    #[test]
    fn stops_hold_the_phrase() {
        let clock = clock();
        // Phrase 1 is 2 s after phrase 0; the stop lasts 1 s.
        let inside = clock.reading(1500.0 + 2500.0);
        assert!(inside.stopped);
        assert!((inside.phrase - 1.0).abs() < 1e-9);
        let after = clock.reading(1500.0 + 4000.0);
        assert!(!after.stopped);
        assert!((after.phrase - 1.5).abs() < 1e-9);
    }

    #[test]
    fn polls_the_audio_engine() {
        let path = std::env::temp_dir().join(format!("wgibeat-clock-{}.ogg", std::process::id()));
        std::fs::write(&path, b"x").expect("write");
        let mut audio = SilentAudio::new();
        let ch = audio.play(&path, false, false).expect("plays");
        let clock = clock();
        audio.set_position(ch, clock.start_position_ms()).expect("seek");
        audio.advance(1250.0);
        let reading = clock.poll(&audio, ch).expect("reads");
        assert!(reading.phrase.abs() < 1e-9);
        assert!(!clock.is_finished(reading.audio_ms));
        assert!(clock.is_finished(30_000.0));
        assert!((clock.end_song_ms() - 28_500.0).abs() < 1e-9);
        let _ = std::fs::remove_file(&path);
    }
}
