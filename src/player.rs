use std::process::{Child, Command, Stdio};

use crate::config::PlayerConfig;
use crate::reel::{PlaybackError, Player};

const URL_PLACEHOLDER: &str = "%URL%";

/// Plays reels through an external command such as mpv. Only one child runs
/// at a time; moving to another reel kills the previous one.
pub struct ExternalPlayer {
    command: Vec<String>,
    mute_args: Vec<String>,
    running: Option<(usize, Child)>,
}

impl ExternalPlayer {
    pub fn new(cfg: &PlayerConfig) -> Self {
        Self {
            command: cfg.video_command.clone(),
            mute_args: cfg.mute_args.clone(),
            running: None,
        }
    }

    fn build_args(&self, url: &str, muted: bool) -> Result<(String, Vec<String>), PlaybackError> {
        let (program, rest) = self
            .command
            .split_first()
            .ok_or_else(|| PlaybackError::Blocked("player.video_command is empty".into()))?;
        let mut args: Vec<String> = Vec::with_capacity(rest.len() + self.mute_args.len() + 1);
        let mut substituted = false;
        for arg in rest {
            if arg.contains(URL_PLACEHOLDER) {
                substituted = true;
                args.push(arg.replace(URL_PLACEHOLDER, url));
            } else {
                args.push(arg.clone());
            }
        }
        if muted {
            args.extend(self.mute_args.iter().cloned());
        }
        if !substituted {
            args.push(url.to_string());
        }
        Ok((program.clone(), args))
    }

    fn stop(&mut self) {
        if let Some((index, mut child)) = self.running.take() {
            if let Err(err) = child.kill() {
                tracing::debug!(index, error = %err, "player already exited");
            }
            let _ = child.wait();
        }
    }
}

impl Player for ExternalPlayer {
    fn play(&mut self, index: usize, url: &str, muted: bool) -> Result<(), PlaybackError> {
        if url.trim().is_empty() {
            return Err(PlaybackError::MissingSource);
        }
        self.stop();
        let (program, args) = self.build_args(url, muted)?;
        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        tracing::info!(index, muted, program = %program, "started reel playback");
        self.running = Some((index, child));
        Ok(())
    }

    fn pause_and_reset(&mut self, index: usize) {
        if matches!(self.running, Some((running, _)) if running == index) {
            self.stop();
        }
    }
}

impl Drop for ExternalPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(command: &[&str]) -> ExternalPlayer {
        ExternalPlayer::new(&PlayerConfig {
            video_command: command.iter().map(|s| s.to_string()).collect(),
            mute_args: vec!["--mute=yes".into()],
            autoplay: true,
        })
    }

    #[test]
    fn substitutes_url_placeholder() {
        let (program, args) = player(&["mpv", "--fs", "%URL%"])
            .build_args("https://cdn/r.mp4", false)
            .unwrap();
        assert_eq!(program, "mpv");
        assert_eq!(args, vec!["--fs", "https://cdn/r.mp4"]);
    }

    #[test]
    fn appends_url_and_mute_flags() {
        let (_, args) = player(&["vlc"]).build_args("u", true).unwrap();
        assert_eq!(args, vec!["--mute=yes", "u"]);
    }

    #[test]
    fn empty_command_is_blocked() {
        let err = player(&[]).build_args("u", false).unwrap_err();
        assert!(matches!(err, PlaybackError::Blocked(_)));
    }

    #[test]
    fn missing_binary_reports_launch_error() {
        let mut player = player(&["reelgram-definitely-missing-player"]);
        let err = player.play(0, "u", false).unwrap_err();
        assert!(matches!(err, PlaybackError::Launch(_)));
    }
}
