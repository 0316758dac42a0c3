use std::path::PathBuf;

use clap::Parser;

use crate::channel::LanguageCode;
use crate::config::Settings;

/// Capture microphone audio and stream it to a transcription server.
#[derive(Debug, Parser)]
#[command(name = "streamscribe", version, about)]
pub struct Cli {
    /// WebSocket endpoint of the streaming server
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Recognition language, e.g. en-US
    #[arg(long, value_name = "CODE")]
    pub language: Option<LanguageCode>,

    /// Mono samples per transport frame
    #[arg(long, value_name = "SAMPLES")]
    pub buffer_size: Option<usize>,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Overlay command-line flags onto loaded settings. Flags win.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(endpoint) = &self.endpoint {
            settings.endpoint = endpoint.clone();
        }
        if let Some(language) = self.language {
            settings.language = language;
        }
        if let Some(buffer_size) = self.buffer_size {
            settings.buffer_size = buffer_size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "streamscribe",
            "--endpoint",
            "ws://other:9000/stream",
            "--language",
            "en-GB",
        ]);

        let mut settings = Settings::default();
        cli.apply(&mut settings);

        assert_eq!(settings.endpoint, "ws://other:9000/stream");
        assert_eq!(settings.language, LanguageCode::EnGb);
        assert_eq!(settings.buffer_size, Settings::default().buffer_size);
    }

    #[test]
    fn absent_flags_leave_settings_alone() {
        let cli = Cli::parse_from(["streamscribe"]);
        let mut settings = Settings::default();
        let before = settings.clone();
        cli.apply(&mut settings);
        assert_eq!(settings, before);
    }
}
