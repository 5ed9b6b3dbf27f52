//! Description of an advertised stream.

use std::fmt;

/// Metadata of a stream as advertised by the transport's resolver.
///
/// # Example
///
/// ```
/// use inlet_bridge::StreamInfo;
///
/// let info = StreamInfo::new("audio", 2, 44100.0).with_source_id("wav_file_test.wav");
/// assert_eq!(info.name, "audio");
/// assert_eq!(info.stream_type, "audio");
/// assert!(!info.is_irregular());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Name the stream is advertised under; the match key for discovery.
    pub name: String,
    /// Content type, e.g. `"audio"` or `"EEG"`.
    pub stream_type: String,
    /// Number of channels per frame.
    pub channel_count: usize,
    /// Nominal sample rate in Hz; `0.0` for irregular streams.
    pub nominal_srate: f64,
    /// Identifier of the sending process, unique per outlet if set.
    pub source_id: String,
}

impl StreamInfo {
    /// Creates stream metadata with the stream type defaulting to `"audio"`.
    pub fn new(name: impl Into<String>, channel_count: usize, nominal_srate: f64) -> Self {
        Self {
            name: name.into(),
            stream_type: "audio".to_string(),
            channel_count,
            nominal_srate,
            source_id: String::new(),
        }
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_type(mut self, stream_type: impl Into<String>) -> Self {
        self.stream_type = stream_type.into();
        self
    }

    /// Sets the source identifier.
    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    /// Returns `true` if the stream has no fixed sample rate.
    #[must_use]
    pub fn is_irregular(&self) -> bool {
        self.nominal_srate <= 0.0
    }

    /// Returns `true` if the nominal rate is within `tolerance` (relative)
    /// of `local_rate`.
    #[must_use]
    pub fn rate_matches(&self, local_rate: f64, tolerance: f64) -> bool {
        !self.is_irregular() && (self.nominal_srate - local_rate).abs() <= local_rate * tolerance
    }
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}), {} channels @ {:.1}Hz",
            self.name, self.stream_type, self.channel_count, self.nominal_srate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_matches_within_tolerance() {
        let info = StreamInfo::new("audio", 2, 44100.0);
        assert!(info.rate_matches(44100.0, 0.001));
        // 40 Hz off is just under 0.1%
        assert!(StreamInfo::new("audio", 2, 44140.0).rate_matches(44100.0, 0.001));
        assert!(!StreamInfo::new("audio", 2, 44150.0).rate_matches(44100.0, 0.001));
        assert!(!StreamInfo::new("audio", 2, 48000.0).rate_matches(44100.0, 0.001));
    }

    #[test]
    fn test_irregular_never_matches() {
        let info = StreamInfo::new("markers", 1, 0.0);
        assert!(info.is_irregular());
        assert!(!info.rate_matches(0.0, 0.5));
    }

    #[test]
    fn test_display() {
        let info = StreamInfo::new("eeg", 8, 250.0).with_type("EEG");
        assert_eq!(info.to_string(), "eeg (EEG), 8 channels @ 250.0Hz");
    }
}
