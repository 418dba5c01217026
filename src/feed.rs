use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::data::{CommentService, FeedService, InteractionService, ProfileService};
use crate::engagement::{
    EngagementAction, EngagementCounters, EngagementLedger, ServerCounts, Settlement, Ticket,
};
use crate::media::MediaRef;
use crate::navigation::{GalleryCursor, NavigationError};
use crate::nhost::{self, Target};
use crate::reel::{Player, ReelCursor, Swipe, SwipeController};
use crate::session;

pub const TOAST_TTL: Duration = Duration::from_secs(4);
const MAX_TOASTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Posts,
    Reels,
}

impl FeedKind {
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "reels" | "reel" => FeedKind::Reels,
            _ => FeedKind::Posts,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeedKind::Posts => "Posts",
            FeedKind::Reels => "Reels",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub target: Target,
    pub author: String,
    pub caption: String,
    pub music: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub media: MediaRef,
    pub gallery: Option<GalleryCursor>,
    counters: EngagementCounters,
}

impl FeedItem {
    pub fn from_post(post: nhost::Post) -> Self {
        let media = post.media();
        let counters = post.counters();
        Self {
            target: Target::post(post.id),
            author: post
                .user
                .as_ref()
                .map(|user| user.username.clone())
                .unwrap_or_default(),
            caption: post.caption.unwrap_or_default(),
            music: None,
            created_at: post.created_at,
            gallery: media.cursor(),
            media,
            counters,
        }
    }

    pub fn from_reel(reel: nhost::Reel) -> Self {
        let media = reel.media();
        let counters = reel.counters();
        let music = reel.music();
        Self {
            target: Target::reel(reel.id),
            author: reel
                .user
                .as_ref()
                .map(|user| user.username.clone())
                .unwrap_or_default(),
            caption: reel.caption.unwrap_or_default(),
            music,
            created_at: reel.created_at,
            gallery: media.cursor(),
            media,
            counters,
        }
    }

    pub fn current_url(&self) -> Option<&str> {
        let index = self.gallery.map(|cursor| cursor.index()).unwrap_or(0);
        self.media.get(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub level: ToastLevel,
    pub created: Instant,
}

pub enum AsyncResponse {
    Feed {
        request_id: u64,
        kind: FeedKind,
        result: Result<Vec<FeedItem>>,
    },
    Comments {
        target: Target,
        result: Result<Vec<nhost::Comment>>,
    },
    Profile {
        result: Result<Option<nhost::Profile>>,
    },
    Engagement {
        ticket: Ticket,
        result: Result<ServerCounts, String>,
        comment: Option<nhost::Comment>,
    },
}

#[derive(Clone)]
pub struct Services {
    pub feed: Arc<dyn FeedService>,
    pub comments: Arc<dyn CommentService>,
    pub interactions: Arc<dyn InteractionService>,
    pub profiles: Arc<dyn ProfileService>,
}

pub struct FeedState {
    services: Services,
    session: Arc<session::Manager>,
    kind: FeedKind,
    posts: Vec<FeedItem>,
    reels: Vec<FeedItem>,
    post_cursor: Option<GalleryCursor>,
    reel_cursor: Option<ReelCursor>,
    swipe: SwipeController,
    player: Box<dyn Player>,
    ledger: EngagementLedger,
    comments: HashMap<Target, Vec<nhost::Comment>>,
    pending_comments: HashSet<Target>,
    failed_comments: HashSet<Target>,
    feed_installed: bool,
    profile: Option<nhost::Profile>,
    toasts: VecDeque<Toast>,
    pending_feeds: HashMap<FeedKind, u64>,
    next_request_id: u64,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
}

impl FeedState {
    pub fn new(
        services: Services,
        session: Arc<session::Manager>,
        swipe: SwipeController,
        player: Box<dyn Player>,
        kind: FeedKind,
    ) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            services,
            session,
            kind,
            posts: Vec::new(),
            reels: Vec::new(),
            post_cursor: None,
            reel_cursor: None,
            swipe,
            player,
            ledger: EngagementLedger::new(),
            comments: HashMap::new(),
            pending_comments: HashSet::new(),
            failed_comments: HashSet::new(),
            feed_installed: false,
            profile: None,
            toasts: VecDeque::new(),
            pending_feeds: HashMap::new(),
            next_request_id: 0,
            response_tx,
            response_rx,
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn items(&self) -> &[FeedItem] {
        match self.kind {
            FeedKind::Posts => &self.posts,
            FeedKind::Reels => &self.reels,
        }
    }

    pub fn selected_index(&self) -> Option<usize> {
        match self.kind {
            FeedKind::Posts => self.post_cursor.map(|cursor| cursor.index()),
            FeedKind::Reels => self.reel_cursor.as_ref().map(ReelCursor::index),
        }
    }

    pub fn current(&self) -> Option<&FeedItem> {
        self.items().get(self.selected_index()?)
    }

    fn current_mut(&mut self) -> Option<&mut FeedItem> {
        let index = self.selected_index()?;
        match self.kind {
            FeedKind::Posts => self.posts.get_mut(index),
            FeedKind::Reels => self.reels.get_mut(index),
        }
    }

    pub fn reel_cursor(&self) -> Option<&ReelCursor> {
        self.reel_cursor.as_ref()
    }

    pub fn counters(&self, target: &Target) -> EngagementCounters {
        self.ledger.counters(&target.key()).unwrap_or_default()
    }

    pub fn comments(&self, target: &Target) -> Option<&[nhost::Comment]> {
        self.comments.get(target).map(Vec::as_slice)
    }

    pub fn profile(&self) -> Option<&nhost::Profile> {
        self.profile.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_feeds.contains_key(&self.kind)
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.active().is_some()
    }

    pub fn push_toast(&mut self, level: ToastLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            ToastLevel::Error => tracing::warn!("{message}"),
            ToastLevel::Info => tracing::debug!("{message}"),
        }
        self.toasts.push_back(Toast {
            message,
            level,
            created: Instant::now(),
        });
        while self.toasts.len() > MAX_TOASTS {
            self.toasts.pop_front();
        }
    }

    pub fn latest_toast(&self) -> Option<&Toast> {
        self.toasts.back()
    }

    pub fn prune_toasts(&mut self, now: Instant) -> bool {
        let before = self.toasts.len();
        self.toasts
            .retain(|toast| now.saturating_duration_since(toast.created) < TOAST_TTL);
        before != self.toasts.len()
    }

    pub fn switch_to(&mut self, kind: FeedKind) {
        if self.kind == kind {
            return;
        }
        if let Some(cursor) = self.reel_cursor.as_mut() {
            cursor.deactivate(self.player.as_mut());
        }
        self.kind = kind;
        if kind == FeedKind::Reels {
            self.activate_reel();
        }
        let loaded = match kind {
            FeedKind::Posts => !self.posts.is_empty(),
            FeedKind::Reels => !self.reels.is_empty(),
        };
        if !loaded && !self.pending_feeds.contains_key(&kind) {
            self.refresh();
        }
    }

    pub fn refresh(&mut self) {
        self.failed_comments.clear();
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let kind = self.kind;
        self.pending_feeds.insert(kind, request_id);
        tracing::debug!(request_id, feed = kind.label(), "loading feed");

        let service = Arc::clone(&self.services.feed);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = match kind {
                FeedKind::Posts => service
                    .load_posts()
                    .map(|posts| posts.into_iter().map(FeedItem::from_post).collect()),
                FeedKind::Reels => service
                    .load_reels()
                    .map(|reels| reels.into_iter().map(FeedItem::from_reel).collect()),
            };
            let _ = tx.send(AsyncResponse::Feed {
                request_id,
                kind,
                result,
            });
        });
    }

    pub fn load_profile(&mut self) {
        let Some(user_id) = self.session.user_id() else {
            return;
        };
        let service = Arc::clone(&self.services.profiles);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.load_profile(&user_id);
            let _ = tx.send(AsyncResponse::Profile { result });
        });
    }

    // Failed targets stay skipped until a refresh or selection change.
    pub fn load_comments(&mut self) {
        let Some(target) = self.current().map(|item| item.target.clone()) else {
            return;
        };
        if self.comments.contains_key(&target)
            || self.failed_comments.contains(&target)
            || !self.pending_comments.insert(target.clone())
        {
            return;
        }
        let service = Arc::clone(&self.services.comments);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.load_comments(&target);
            let _ = tx.send(AsyncResponse::Comments { target, result });
        });
    }

    pub fn clear_failed_comments(&mut self) {
        self.failed_comments.clear();
    }

    pub fn next_item(&mut self) -> bool {
        self.step(Swipe::Next)
    }

    pub fn previous_item(&mut self) -> bool {
        self.step(Swipe::Previous)
    }

    fn step(&mut self, swipe: Swipe) -> bool {
        match self.kind {
            FeedKind::Posts => {
                let Some(cursor) = self.post_cursor else {
                    return false;
                };
                let next = match swipe {
                    Swipe::Next => cursor.advance(),
                    Swipe::Previous => cursor.retreat(),
                };
                self.post_cursor = Some(next);
                next != cursor
            }
            FeedKind::Reels => {
                let urls = reel_urls(&self.reels);
                match self.reel_cursor.as_mut() {
                    Some(cursor) => {
                        self.swipe
                            .apply(cursor, self.player.as_mut(), &urls, Some(swipe))
                    }
                    None => false,
                }
            }
        }
    }

    pub fn wheel(&mut self, delta_y: f64) -> bool {
        match self.swipe.wheel(delta_y) {
            Some(swipe) => self.step(swipe),
            None => false,
        }
    }

    pub fn touch_start(&mut self, y: f64) {
        self.swipe.touch_start(y);
    }

    pub fn touch_end(&mut self, y: f64) -> bool {
        match self.swipe.touch_end(y) {
            Some(swipe) => self.step(swipe),
            None => false,
        }
    }

    pub fn gallery_next(&mut self) -> bool {
        self.move_gallery(GalleryCursor::advance)
    }

    pub fn gallery_previous(&mut self) -> bool {
        self.move_gallery(GalleryCursor::retreat)
    }

    fn move_gallery(&mut self, op: fn(GalleryCursor) -> GalleryCursor) -> bool {
        let Some(item) = self.current_mut() else {
            return false;
        };
        let Some(cursor) = item.gallery else {
            return false;
        };
        let next = op(cursor);
        item.gallery = Some(next);
        next != cursor
    }

    pub fn gallery_jump(&mut self, index: usize) -> Result<(), NavigationError> {
        let item = self.current_mut().ok_or(NavigationError::Empty)?;
        let cursor = item.gallery.ok_or(NavigationError::Empty)?;
        item.gallery = Some(cursor.jump_to(index)?);
        Ok(())
    }

    pub fn reel_jump(&mut self, index: usize) -> Result<bool, NavigationError> {
        let urls = reel_urls(&self.reels);
        let cursor = self.reel_cursor.as_mut().ok_or(NavigationError::Empty)?;
        cursor.jump_to(index, self.player.as_mut(), &urls)
    }

    pub fn toggle_like(&mut self) {
        let Some(target) = self.engagement_target("like") else {
            return;
        };
        let Some(ticket) = self.ledger.begin(&target.key(), EngagementAction::ToggleLike) else {
            return;
        };
        let service = Arc::clone(&self.services.interactions);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = if ticket.liked {
                service.like(&target)
            } else {
                service.unlike(&target)
            };
            let _ = tx.send(AsyncResponse::Engagement {
                ticket,
                result: result.map_err(|err| err.to_string()),
                comment: None,
            });
        });
    }

    pub fn comment(&mut self, text: &str) {
        let content = text.trim().to_string();
        if content.is_empty() {
            self.push_toast(ToastLevel::Info, "Comment is empty.");
            return;
        }
        let Some(target) = self.engagement_target("comment") else {
            return;
        };
        let Some(ticket) = self.ledger.begin(&target.key(), EngagementAction::Comment) else {
            return;
        };
        let service = Arc::clone(&self.services.interactions);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let (result, comment) = match service.comment(&target, &content) {
                Ok((comment, counts)) => (Ok(counts), Some(comment)),
                Err(err) => (Err(err.to_string()), None),
            };
            let _ = tx.send(AsyncResponse::Engagement {
                ticket,
                result,
                comment,
            });
        });
    }

    pub fn share(&mut self) -> Option<String> {
        let target = self.engagement_target("share")?;
        let link = self.current().and_then(FeedItem::current_url).map(str::to_string);
        let ticket = self.ledger.begin(&target.key(), EngagementAction::Share)?;
        let service = Arc::clone(&self.services.interactions);
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let result = service.share(&target).map_err(|err| err.to_string());
            let _ = tx.send(AsyncResponse::Engagement {
                ticket,
                result,
                comment: None,
            });
        });
        link
    }

    fn engagement_target(&mut self, verb: &str) -> Option<Target> {
        let target = self.current().map(|item| item.target.clone());
        let Some(target) = target else {
            self.push_toast(ToastLevel::Info, format!("Nothing to {verb}."));
            return None;
        };
        if let Err(err) = self.session.require() {
            self.push_toast(ToastLevel::Error, format!("Can't {verb}: {err}."));
            return None;
        }
        Some(target)
    }

    pub fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    pub fn take_feed_installed(&mut self) -> bool {
        std::mem::take(&mut self.feed_installed)
    }

    pub fn wait_async(&mut self, timeout: Duration) -> bool {
        match self.response_rx.recv_timeout(timeout) {
            Ok(message) => {
                self.handle_async_response(message);
                true
            }
            Err(_) => false,
        }
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Feed {
                request_id,
                kind,
                result,
            } => {
                if self.pending_feeds.get(&kind) != Some(&request_id) {
                    tracing::debug!(request_id, "dropping stale feed response");
                    return;
                }
                self.pending_feeds.remove(&kind);
                match result {
                    Ok(items) => self.install_items(kind, items),
                    Err(err) => self.push_toast(
                        ToastLevel::Error,
                        format!("Failed to load {}: {err:#}", kind.label().to_lowercase()),
                    ),
                }
            }
            AsyncResponse::Comments { target, result } => {
                self.pending_comments.remove(&target);
                match result {
                    Ok(comments) => {
                        let local = self.comments.remove(&target).unwrap_or_default();
                        let mut merged = comments;
                        for comment in local {
                            if !merged.iter().any(|existing| existing.id == comment.id) {
                                merged.push(comment);
                            }
                        }
                        self.comments.insert(target, merged);
                    }
                    Err(err) => {
                        self.failed_comments.insert(target);
                        self.push_toast(
                            ToastLevel::Error,
                            format!("Failed to load comments: {err:#}"),
                        );
                    }
                }
            }
            AsyncResponse::Profile { result } => match result {
                Ok(profile) => self.profile = profile,
                Err(err) => tracing::warn!(error = %format!("{err:#}"), "failed to load profile"),
            },
            AsyncResponse::Engagement {
                ticket,
                result,
                comment,
            } => {
                let settlement = self.ledger.settle(&ticket, &result);
                tracing::debug!(key = %ticket.id, ?settlement, "engagement settled");
                match (&result, settlement) {
                    (Err(err), Settlement::RolledBack | Settlement::Superseded) => {
                        let verb = match ticket.action {
                            EngagementAction::ToggleLike if ticket.liked => "like",
                            EngagementAction::ToggleLike => "unlike",
                            EngagementAction::Comment => "comment",
                            EngagementAction::Share => "share",
                        };
                        self.push_toast(ToastLevel::Error, format!("Failed to {verb}: {err}"));
                    }
                    (Ok(_), _) if ticket.action == EngagementAction::Share => {
                        self.push_toast(ToastLevel::Info, "Shared.");
                    }
                    _ => {}
                }
                // Only extend a list that is loaded or loading; an entry on its
                // own would stand in for the remote comments.
                if let Some(comment) = comment {
                    if let Some(target) = self.target_for_key(&ticket.id) {
                        if self.comments.contains_key(&target)
                            || self.pending_comments.contains(&target)
                        {
                            self.comments.entry(target).or_default().push(comment);
                        }
                    }
                }
            }
        }
    }

    fn target_for_key(&self, key: &str) -> Option<Target> {
        self.posts
            .iter()
            .chain(self.reels.iter())
            .map(|item| &item.target)
            .find(|target| target.key() == key)
            .cloned()
    }

    fn install_items(&mut self, kind: FeedKind, items: Vec<FeedItem>) {
        for item in &items {
            self.ledger.seed(item.target.key(), item.counters);
        }
        tracing::info!(feed = kind.label(), count = items.len(), "feed loaded");
        self.feed_installed = true;
        match kind {
            FeedKind::Posts => {
                let previous = self.post_cursor.map(|cursor| cursor.index()).unwrap_or(0);
                self.posts = items;
                self.post_cursor = GalleryCursor::new(self.posts.len())
                    .ok()
                    .map(|cursor| cursor.jump_to(previous).unwrap_or(cursor));
            }
            FeedKind::Reels => {
                if let Some(cursor) = self.reel_cursor.as_mut() {
                    cursor.deactivate(self.player.as_mut());
                }
                self.reels = items;
                self.reel_cursor = ReelCursor::new(self.reels.len()).ok();
                if self.kind == FeedKind::Reels {
                    self.activate_reel();
                }
            }
        }
        let live: Vec<String> = self
            .posts
            .iter()
            .chain(self.reels.iter())
            .map(|item| item.target.key())
            .collect();
        self.ledger.retain_ids(live.iter().map(String::as_str));
    }

    fn activate_reel(&mut self) {
        let urls = reel_urls(&self.reels);
        if let Some(cursor) = self.reel_cursor.as_mut() {
            cursor.activate(self.player.as_mut(), &urls);
        }
    }
}

fn reel_urls(reels: &[FeedItem]) -> Vec<String> {
    reels
        .iter()
        .map(|item| item.media.first().unwrap_or_default().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        MockCommentService, MockFeedService, MockInteractionService, MockProfileService,
    };
    use crate::reel::SilentPlayer;
    use crate::session::Session;
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct BrokenComments {
        calls: AtomicUsize,
    }

    impl CommentService for BrokenComments {
        fn load_comments(&self, _target: &Target) -> Result<Vec<nhost::Comment>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("comments backend down"))
        }
    }

    // Sample posts on the first load, only the first post afterwards.
    #[derive(Default)]
    struct ShrinkingFeed {
        loads: Mutex<usize>,
    }

    impl FeedService for ShrinkingFeed {
        fn load_posts(&self) -> Result<Vec<nhost::Post>> {
            let mut loads = self.loads.lock();
            let mut posts = MockFeedService.load_posts()?;
            if *loads > 0 {
                posts.truncate(1);
            }
            *loads += 1;
            Ok(posts)
        }

        fn load_reels(&self) -> Result<Vec<nhost::Reel>> {
            MockFeedService.load_reels()
        }
    }

    fn mock_services(interactions: MockInteractionService) -> Services {
        Services {
            feed: Arc::new(MockFeedService),
            comments: Arc::new(MockCommentService),
            interactions: Arc::new(interactions),
            profiles: Arc::new(MockProfileService),
        }
    }

    fn state_with(interactions: MockInteractionService, signed_in: bool) -> FeedState {
        state_from(mock_services(interactions), signed_in)
    }

    fn state_from(services: Services, signed_in: bool) -> FeedState {
        let session = Arc::new(session::Manager::new());
        if signed_in {
            session.sign_in(Session {
                user_id: "u1".into(),
                access_token: None,
            });
        }
        FeedState::new(
            services,
            session,
            SwipeController::default(),
            Box::new(SilentPlayer),
            FeedKind::Posts,
        )
    }

    fn loaded(interactions: MockInteractionService, signed_in: bool) -> FeedState {
        load(state_with(interactions, signed_in))
    }

    fn load(mut state: FeedState) -> FeedState {
        state.refresh();
        assert!(state.wait_async(Duration::from_secs(5)));
        state
    }

    #[test]
    fn refresh_installs_items_and_gallery_cursor() {
        let state = loaded(MockInteractionService::default(), true);
        assert!(!state.is_loading());
        assert_eq!(state.items().len(), 2);
        let first = state.current().unwrap();
        assert_eq!(first.gallery.unwrap().item_count(), 3);
        assert_eq!(state.counters(&first.target).like_count, 128);
    }

    #[test]
    fn gallery_navigation_is_clamped() {
        let mut state = loaded(MockInteractionService::default(), true);
        assert!(!state.gallery_previous());
        assert!(state.gallery_next());
        assert!(state.gallery_next());
        assert!(!state.gallery_next());
        assert_eq!(state.current().unwrap().gallery.unwrap().index(), 2);
        assert!(state.gallery_jump(7).is_err());
        state.gallery_jump(0).unwrap();
        assert_eq!(
            state.current().unwrap().current_url(),
            Some("https://picsum.photos/id/10/1080/1080")
        );
    }

    #[test]
    fn like_is_optimistic_and_confirmed() {
        let mut state = loaded(MockInteractionService::default(), true);
        let target = state.current().unwrap().target.clone();
        state.toggle_like();
        let counters = state.counters(&target);
        assert_eq!(counters.like_count, 129);
        assert!(counters.liked);
        assert!(state.wait_async(Duration::from_secs(5)));
        let counters = state.counters(&target);
        assert_eq!(counters.like_count, 129);
        assert!(counters.liked);
    }

    #[test]
    fn failed_like_rolls_back_with_toast() {
        let mut state = loaded(MockInteractionService::failing(1), true);
        let target = state.current().unwrap().target.clone();
        state.toggle_like();
        assert!(state.wait_async(Duration::from_secs(5)));
        let counters = state.counters(&target);
        assert_eq!(counters.like_count, 128);
        assert!(!counters.liked);
        let toast = state.latest_toast().unwrap();
        assert_eq!(toast.level, ToastLevel::Error);
        assert!(toast.message.contains("Failed to like"));
    }

    #[test]
    fn signed_out_like_short_circuits() {
        let mut state = loaded(MockInteractionService::default(), false);
        let target = state.current().unwrap().target.clone();
        state.toggle_like();
        assert_eq!(state.counters(&target).like_count, 128);
        assert!(state.latest_toast().unwrap().message.contains("sign in"));
        assert!(!state.wait_async(Duration::from_millis(50)));
    }

    #[test]
    fn comment_bumps_count_and_lists_comment() {
        let mut state = loaded(MockInteractionService::default(), true);
        let target = state.current().unwrap().target.clone();
        state.load_comments();
        assert!(state.wait_async(Duration::from_secs(5)));
        state.comment("  ");
        assert_eq!(state.counters(&target).comment_count, 4);
        state.comment("nice shot");
        assert_eq!(state.counters(&target).comment_count, 5);
        assert!(state.wait_async(Duration::from_secs(5)));
        assert_eq!(state.counters(&target).comment_count, 5);
        let comments = state.comments(&target).unwrap();
        assert_eq!(comments.last().unwrap().content, "nice shot");
    }

    #[test]
    fn comment_before_fetch_does_not_hide_remote_comments() {
        let mut state = loaded(MockInteractionService::default(), true);
        let target = state.current().unwrap().target.clone();
        state.comment("first!");
        assert!(state.wait_async(Duration::from_secs(5)));
        assert!(state.comments(&target).is_none());

        state.load_comments();
        assert!(state.wait_async(Duration::from_secs(5)));
        let comments = state.comments(&target).unwrap();
        assert!(comments.iter().any(|c| c.id == format!("{}-c1", target.id)));
    }

    #[test]
    fn comment_during_fetch_is_merged_with_remote_list() {
        let mut state = loaded(MockInteractionService::default(), true);
        let target = state.current().unwrap().target.clone();
        state.load_comments();
        state.comment("first!");
        assert!(state.wait_async(Duration::from_secs(5)));
        assert!(state.wait_async(Duration::from_secs(5)));
        let comments = state.comments(&target).unwrap();
        assert_eq!(comments.len(), 2);
        assert!(comments.iter().any(|c| c.content == "first!"));
    }

    #[test]
    fn failed_comment_fetch_waits_for_refresh() {
        let broken = Arc::new(BrokenComments::default());
        let mut services = mock_services(MockInteractionService::default());
        services.comments = Arc::clone(&broken) as Arc<dyn CommentService>;
        let mut state = load(state_from(services, true));

        state.load_comments();
        assert!(state.wait_async(Duration::from_secs(5)));
        assert_eq!(state.latest_toast().unwrap().level, ToastLevel::Error);

        for _ in 0..5 {
            state.load_comments();
            state.poll_async();
        }
        assert!(!state.wait_async(Duration::from_millis(100)));
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);

        state.clear_failed_comments();
        state.load_comments();
        assert!(state.wait_async(Duration::from_secs(5)));
        assert_eq!(broken.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn take_feed_installed_reports_each_feed_once() {
        let mut state = loaded(MockInteractionService::default(), true);
        assert!(state.take_feed_installed());
        assert!(!state.take_feed_installed());
        state.push_toast(ToastLevel::Info, "hello");
        assert!(!state.take_feed_installed());
    }

    #[test]
    fn refresh_drops_ledger_entries_for_vanished_items() {
        let mut services = mock_services(MockInteractionService::default());
        services.feed = Arc::new(ShrinkingFeed::default());
        let mut state = load(state_from(services, true));
        let gone = state.items()[1].target.key();
        assert!(state.ledger.counters(&gone).is_some());

        state.refresh();
        assert!(state.wait_async(Duration::from_secs(5)));
        assert_eq!(state.items().len(), 1);
        assert!(state.ledger.counters(&gone).is_none());
        assert!(state.ledger.counters(&state.items()[0].target.key()).is_some());
    }

    #[test]
    fn share_returns_current_media_link() {
        let mut state = loaded(MockInteractionService::default(), true);
        state.gallery_next();
        let link = state.share();
        assert_eq!(link.as_deref(), Some("https://picsum.photos/id/11/1080/1080"));
        let target = state.current().unwrap().target.clone();
        assert_eq!(state.counters(&target).share_count, 3);
    }

    #[test]
    fn reels_follow_wheel_and_touch_input() {
        let mut state = loaded(MockInteractionService::default(), true);
        state.switch_to(FeedKind::Reels);
        assert!(state.wait_async(Duration::from_secs(5)));
        assert_eq!(state.items().len(), 3);
        assert_eq!(state.reel_cursor().unwrap().active(), Some(0));

        assert!(state.wheel(1.0));
        assert_eq!(state.selected_index(), Some(1));

        state.touch_start(500.0);
        assert!(!state.touch_end(470.0));
        state.touch_start(500.0);
        assert!(state.touch_end(440.0));
        assert_eq!(state.selected_index(), Some(2));
        assert!(!state.wheel(1.0));
        assert_eq!(state.reel_cursor().unwrap().active(), Some(2));

        assert!(state.reel_jump(0).unwrap());
        assert_eq!(state.reel_cursor().unwrap().active(), Some(0));
        assert!(state.reel_jump(5).is_err());

        state.switch_to(FeedKind::Posts);
        assert_eq!(state.reel_cursor().unwrap().active(), None);
    }

    #[test]
    fn post_selection_is_bounded() {
        let mut state = loaded(MockInteractionService::default(), true);
        assert!(!state.previous_item());
        assert!(state.next_item());
        assert!(!state.next_item());
        assert_eq!(state.selected_index(), Some(1));
    }

    #[test]
    fn toasts_expire() {
        let mut state = state_with(MockInteractionService::default(), true);
        state.push_toast(ToastLevel::Info, "hello");
        assert!(!state.prune_toasts(Instant::now()));
        assert!(state.prune_toasts(Instant::now() + TOAST_TTL + Duration::from_millis(1)));
        assert!(state.latest_toast().is_none());
    }
}
