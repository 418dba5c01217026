use thiserror::Error;

use crate::navigation::{GalleryCursor, NavigationError};

pub const DEFAULT_SWIPE_THRESHOLD_PX: f64 = 50.0;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("playback blocked: {0}")]
    Blocked(String),
    #[error("failed to launch player: {0}")]
    Launch(#[from] std::io::Error),
    #[error("no playable media")]
    MissingSource,
}

pub trait Player {
    fn play(&mut self, index: usize, url: &str, muted: bool) -> Result<(), PlaybackError>;
    fn pause_and_reset(&mut self, index: usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing {
        muted: bool,
    },
    Stalled,
}

impl PlaybackState {
    pub fn is_active(&self) -> bool {
        !matches!(self, PlaybackState::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swipe {
    Next,
    Previous,
}

#[derive(Debug, Clone)]
pub struct ReelCursor {
    cursor: GalleryCursor,
    playback: Vec<PlaybackState>,
}

impl ReelCursor {
    pub fn new(total: usize) -> Result<Self, NavigationError> {
        Ok(Self {
            cursor: GalleryCursor::new(total)?,
            playback: vec![PlaybackState::Idle; total],
        })
    }

    pub fn index(&self) -> usize {
        self.cursor.index()
    }

    pub fn total(&self) -> usize {
        self.cursor.item_count()
    }

    pub fn cursor(&self) -> GalleryCursor {
        self.cursor
    }

    pub fn playback(&self, index: usize) -> PlaybackState {
        self.playback.get(index).copied().unwrap_or_default()
    }

    pub fn active(&self) -> Option<usize> {
        self.playback.iter().position(PlaybackState::is_active)
    }

    /// Pauses everything except the current item, then starts it. A blocked
    /// start is retried muted; if that also fails the item is left stalled.
    pub fn activate(&mut self, player: &mut dyn Player, urls: &[String]) {
        let current = self.cursor.index();
        for (idx, state) in self.playback.iter_mut().enumerate() {
            if idx != current {
                if state.is_active() {
                    player.pause_and_reset(idx);
                }
                *state = PlaybackState::Idle;
            }
        }

        let Some(url) = urls.get(current).filter(|url| !url.trim().is_empty()) else {
            tracing::debug!(index = current, "reel has no playable source");
            self.playback[current] = PlaybackState::Stalled;
            return;
        };

        self.playback[current] = match player.play(current, url, false) {
            Ok(()) => PlaybackState::Playing { muted: false },
            Err(err) => {
                tracing::debug!(index = current, error = %err, "unmuted playback failed, retrying muted");
                match player.play(current, url, true) {
                    Ok(()) => PlaybackState::Playing { muted: true },
                    Err(err) => {
                        tracing::debug!(index = current, error = %err, "muted playback failed");
                        PlaybackState::Stalled
                    }
                }
            }
        };
    }

    pub fn deactivate(&mut self, player: &mut dyn Player) {
        for (idx, state) in self.playback.iter_mut().enumerate() {
            if state.is_active() {
                player.pause_and_reset(idx);
            }
            *state = PlaybackState::Idle;
        }
    }

    pub fn step(&mut self, swipe: Swipe, player: &mut dyn Player, urls: &[String]) -> bool {
        let before = self.cursor.index();
        self.cursor = match swipe {
            Swipe::Next => self.cursor.advance(),
            Swipe::Previous => self.cursor.retreat(),
        };
        let moved = self.cursor.index() != before;
        if moved {
            self.activate(player, urls);
        }
        moved
    }

    pub fn jump_to(
        &mut self,
        index: usize,
        player: &mut dyn Player,
        urls: &[String],
    ) -> Result<bool, NavigationError> {
        let before = self.cursor.index();
        self.cursor = self.cursor.jump_to(index)?;
        let moved = self.cursor.index() != before;
        if moved {
            self.activate(player, urls);
        }
        Ok(moved)
    }
}

#[derive(Debug, Clone)]
pub struct SwipeController {
    threshold: f64,
    wheel_min_delta: f64,
    touch_origin: Option<f64>,
}

impl Default for SwipeController {
    fn default() -> Self {
        Self::new(DEFAULT_SWIPE_THRESHOLD_PX, 0.0)
    }
}

impl SwipeController {
    pub fn new(threshold: f64, wheel_min_delta: f64) -> Self {
        Self {
            threshold: threshold.max(0.0),
            wheel_min_delta: wheel_min_delta.max(0.0),
            touch_origin: None,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn touch_start(&mut self, y: f64) {
        self.touch_origin = Some(y);
    }

    pub fn touch_end(&mut self, y: f64) -> Option<Swipe> {
        let start = self.touch_origin.take()?;
        let diff = start - y;
        if !diff.is_finite() || diff.abs() <= self.threshold {
            return None;
        }
        if diff > 0.0 {
            Some(Swipe::Next)
        } else {
            Some(Swipe::Previous)
        }
    }

    pub fn wheel(&mut self, delta_y: f64) -> Option<Swipe> {
        if !delta_y.is_finite() {
            return None;
        }
        if self.wheel_min_delta > 0.0 && delta_y.abs() <= self.wheel_min_delta {
            return None;
        }
        if delta_y > 0.0 {
            Some(Swipe::Next)
        } else {
            Some(Swipe::Previous)
        }
    }

    pub fn apply(
        &self,
        cursor: &mut ReelCursor,
        player: &mut dyn Player,
        urls: &[String],
        swipe: Option<Swipe>,
    ) -> bool {
        match swipe {
            Some(swipe) => cursor.step(swipe, player, urls),
            None => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct SilentPlayer;

impl Player for SilentPlayer {
    fn play(&mut self, _index: usize, _url: &str, _muted: bool) -> Result<(), PlaybackError> {
        Ok(())
    }

    fn pause_and_reset(&mut self, _index: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingPlayer {
        block_unmuted: bool,
        block_all: bool,
        played: Vec<(usize, bool)>,
        paused: Vec<usize>,
    }

    impl Player for RecordingPlayer {
        fn play(&mut self, index: usize, _url: &str, muted: bool) -> Result<(), PlaybackError> {
            if self.block_all || (self.block_unmuted && !muted) {
                return Err(PlaybackError::Blocked("autoplay".into()));
            }
            self.played.push((index, muted));
            Ok(())
        }

        fn pause_and_reset(&mut self, index: usize) {
            self.paused.push(index);
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://cdn/reel{i}.mp4")).collect()
    }

    #[test]
    fn long_swipe_up_advances_once() {
        let mut controller = SwipeController::default();
        let mut cursor = ReelCursor::new(3).unwrap();
        let mut player = RecordingPlayer::default();
        controller.touch_start(500.0);
        let swipe = controller.touch_end(440.0);
        assert_eq!(swipe, Some(Swipe::Next));
        assert!(controller.apply(&mut cursor, &mut player, &urls(3), swipe));
        assert_eq!(cursor.index(), 1);
    }

    #[test]
    fn short_swipe_is_a_tap() {
        let mut controller = SwipeController::default();
        controller.touch_start(500.0);
        assert_eq!(controller.touch_end(470.0), None);
        controller.touch_start(500.0);
        assert_eq!(controller.touch_end(450.0), None);
    }

    #[test]
    fn swipe_down_retreats() {
        let mut controller = SwipeController::default();
        controller.touch_start(200.0);
        assert_eq!(controller.touch_end(300.0), Some(Swipe::Previous));
    }

    #[test]
    fn touch_end_without_start_is_ignored() {
        let mut controller = SwipeController::default();
        assert_eq!(controller.touch_end(10.0), None);
        controller.touch_start(500.0);
        assert!(controller.touch_end(100.0).is_some());
        assert_eq!(controller.touch_end(100.0), None);
    }

    #[test]
    fn wheel_moves_one_item_per_tick() {
        let mut controller = SwipeController::default();
        assert_eq!(controller.wheel(3.0), Some(Swipe::Next));
        assert_eq!(controller.wheel(-0.5), Some(Swipe::Previous));
        assert_eq!(controller.wheel(0.0), Some(Swipe::Previous));
        assert_eq!(controller.wheel(f64::NAN), None);
    }

    #[test]
    fn wheel_threshold_is_configurable() {
        let mut controller = SwipeController::new(DEFAULT_SWIPE_THRESHOLD_PX, 10.0);
        assert_eq!(controller.wheel(4.0), None);
        assert_eq!(controller.wheel(40.0), Some(Swipe::Next));
    }

    #[test]
    fn steps_are_bounded() {
        let mut cursor = ReelCursor::new(2).unwrap();
        let mut player = RecordingPlayer::default();
        let urls = urls(2);
        assert!(!cursor.step(Swipe::Previous, &mut player, &urls));
        assert!(cursor.step(Swipe::Next, &mut player, &urls));
        assert!(!cursor.step(Swipe::Next, &mut player, &urls));
        assert_eq!(cursor.index(), 1);
    }

    #[test]
    fn only_one_reel_plays_at_a_time() {
        let mut cursor = ReelCursor::new(3).unwrap();
        let mut player = RecordingPlayer::default();
        let urls = urls(3);
        cursor.activate(&mut player, &urls);
        cursor.step(Swipe::Next, &mut player, &urls);
        cursor.step(Swipe::Next, &mut player, &urls);

        let active: Vec<usize> = (0..3)
            .filter(|idx| cursor.playback(*idx).is_active())
            .collect();
        assert_eq!(active, vec![2]);
        assert_eq!(player.paused, vec![0, 1]);
        assert_eq!(player.played, vec![(0, false), (1, false), (2, false)]);
    }

    #[test]
    fn blocked_autoplay_falls_back_to_muted() {
        let mut cursor = ReelCursor::new(1).unwrap();
        let mut player = RecordingPlayer {
            block_unmuted: true,
            ..Default::default()
        };
        cursor.activate(&mut player, &urls(1));
        assert_eq!(cursor.playback(0), PlaybackState::Playing { muted: true });
    }

    #[test]
    fn failed_muted_retry_is_swallowed() {
        let mut cursor = ReelCursor::new(2).unwrap();
        let mut player = RecordingPlayer {
            block_all: true,
            ..Default::default()
        };
        let urls = urls(2);
        cursor.activate(&mut player, &urls);
        assert_eq!(cursor.playback(0), PlaybackState::Stalled);
        assert!(cursor.step(Swipe::Next, &mut player, &urls));
        assert_eq!(cursor.playback(0), PlaybackState::Idle);
        assert_eq!(cursor.active(), Some(1));
    }

    #[test]
    fn deactivate_pauses_the_live_reel() {
        let mut cursor = ReelCursor::new(2).unwrap();
        let mut player = RecordingPlayer::default();
        cursor.activate(&mut player, &urls(2));
        cursor.deactivate(&mut player);
        assert_eq!(cursor.active(), None);
        assert_eq!(player.paused, vec![0]);
    }
}
