//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::params::AmplitudeRange;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "wavemesh")]
#[command(about = "Audio-reactive wireframe surface with microphone clips", long_about = None)]
pub struct Args {
    /// WAV file loaded into the track player (press P to play)
    #[arg(long, value_name = "WAV")]
    pub track: Option<PathBuf>,

    /// Initial surface amplitude (clamped to the slider range)
    #[arg(long, value_name = "AMPLITUDE")]
    pub amplitude: Option<f32>,

    /// Start without the control panel (amplitude and wireframe keys disabled)
    #[arg(long)]
    pub no_controls: bool,

    /// Start with the solid surface instead of the wireframe
    #[arg(long)]
    pub solid: bool,
}

impl Args {
    /// Starting amplitude within `range`
    pub fn initial_amplitude(&self, range: &AmplitudeRange) -> f32 {
        range.clamp(self.amplitude.unwrap_or(range.default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["wavemesh"]);
        assert!(args.track.is_none());
        assert!(!args.no_controls);
        assert!(!args.solid);
        assert_eq!(args.initial_amplitude(&AmplitudeRange::default()), 3.0);
    }

    #[test]
    fn test_amplitude_is_clamped() {
        let args = Args::parse_from(["wavemesh", "--amplitude", "12", "--solid"]);
        assert_eq!(args.initial_amplitude(&AmplitudeRange::default()), 8.0);
        assert!(args.solid);
    }

    #[test]
    fn test_track_path() {
        let args = Args::parse_from(["wavemesh", "--track", "song.wav", "--no-controls"]);
        assert_eq!(args.track, Some(PathBuf::from("song.wav")));
        assert!(args.no_controls);
    }
}
