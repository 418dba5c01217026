use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::engagement::ServerCounts;
use crate::nhost::{self, GatewayError, Target};
use crate::session;

pub const DEFAULT_PAGE_SIZE: u32 = 30;

pub trait FeedService: Send + Sync {
    fn load_posts(&self) -> Result<Vec<nhost::Post>>;
    fn load_reels(&self) -> Result<Vec<nhost::Reel>>;
}

pub trait CommentService: Send + Sync {
    fn load_comments(&self, target: &Target) -> Result<Vec<nhost::Comment>>;
}

/// Engagement mutations. These return [`GatewayError`] rather than `anyhow`
/// so callers can tell a missing session from a failed request.
pub trait InteractionService: Send + Sync {
    fn like(&self, target: &Target) -> Result<ServerCounts, GatewayError>;
    fn unlike(&self, target: &Target) -> Result<ServerCounts, GatewayError>;
    fn comment(
        &self,
        target: &Target,
        content: &str,
    ) -> Result<(nhost::Comment, ServerCounts), GatewayError>;
    fn share(&self, target: &Target) -> Result<ServerCounts, GatewayError>;
}

pub trait ProfileService: Send + Sync {
    fn load_profile(&self, user_id: &str) -> Result<Option<nhost::Profile>>;
}

pub struct NhostFeedService {
    client: Arc<nhost::Client>,
    session: Arc<session::Manager>,
    page_size: u32,
}

impl NhostFeedService {
    pub fn new(client: Arc<nhost::Client>, session: Arc<session::Manager>) -> Self {
        Self {
            client,
            session,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl FeedService for NhostFeedService {
    fn load_posts(&self) -> Result<Vec<nhost::Post>> {
        let viewer = self.session.user_id();
        self.client
            .posts(self.page_size, viewer.as_deref())
            .context("fetch posts")
    }

    fn load_reels(&self) -> Result<Vec<nhost::Reel>> {
        let viewer = self.session.user_id();
        self.client
            .reels(self.page_size, viewer.as_deref())
            .context("fetch reels")
    }
}

pub struct NhostCommentService {
    client: Arc<nhost::Client>,
}

impl NhostCommentService {
    pub fn new(client: Arc<nhost::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for NhostCommentService {
    fn load_comments(&self, target: &Target) -> Result<Vec<nhost::Comment>> {
        self.client.comments(target).context("fetch comments")
    }
}

pub struct NhostInteractionService {
    client: Arc<nhost::Client>,
    session: Arc<session::Manager>,
}

impl NhostInteractionService {
    pub fn new(client: Arc<nhost::Client>, session: Arc<session::Manager>) -> Self {
        Self { client, session }
    }
}

impl InteractionService for NhostInteractionService {
    fn like(&self, target: &Target) -> Result<ServerCounts, GatewayError> {
        let session = self.session.require()?;
        self.client.like(target, &session.user_id)
    }

    fn unlike(&self, target: &Target) -> Result<ServerCounts, GatewayError> {
        let session = self.session.require()?;
        self.client.unlike(target, &session.user_id)
    }

    fn comment(
        &self,
        target: &Target,
        content: &str,
    ) -> Result<(nhost::Comment, ServerCounts), GatewayError> {
        let session = self.session.require()?;
        self.client.comment(target, &session.user_id, content)
    }

    fn share(&self, target: &Target) -> Result<ServerCounts, GatewayError> {
        let session = self.session.require()?;
        self.client.share(target, &session.user_id)
    }
}

pub struct NhostProfileService {
    client: Arc<nhost::Client>,
}

impl NhostProfileService {
    pub fn new(client: Arc<nhost::Client>) -> Self {
        Self { client }
    }
}

impl ProfileService for NhostProfileService {
    fn load_profile(&self, user_id: &str) -> Result<Option<nhost::Profile>> {
        self.client.profile(user_id).context("fetch profile")
    }
}

#[derive(Default)]
pub struct MockFeedService;

impl FeedService for MockFeedService {
    fn load_posts(&self) -> Result<Vec<nhost::Post>> {
        Ok(mock_posts())
    }

    fn load_reels(&self) -> Result<Vec<nhost::Reel>> {
        Ok(mock_reels())
    }
}

#[derive(Default)]
pub struct MockCommentService;

impl CommentService for MockCommentService {
    fn load_comments(&self, target: &Target) -> Result<Vec<nhost::Comment>> {
        Ok(vec![nhost::Comment {
            id: format!("{}-c1", target.id),
            post_id: Some(target.id.clone()),
            user_id: "mock".into(),
            content: "Comments are unavailable offline.".into(),
            created_at: None,
            user: Some(mock_profile("reelgram")),
        }])
    }
}

/// Accepts every mutation locally. Can be told to fail the next calls, which
/// exercises the rollback path without a backend.
#[derive(Default)]
pub struct MockInteractionService {
    failures: Mutex<u32>,
}

impl MockInteractionService {
    pub fn failing(times: u32) -> Self {
        Self {
            failures: Mutex::new(times),
        }
    }

    fn check(&self) -> Result<(), GatewayError> {
        let mut remaining = self.failures.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(GatewayError::Graphql(vec!["mock failure".into()]));
        }
        Ok(())
    }
}

impl InteractionService for MockInteractionService {
    fn like(&self, _target: &Target) -> Result<ServerCounts, GatewayError> {
        self.check()?;
        Ok(ServerCounts {
            liked: Some(true),
            ..Default::default()
        })
    }

    fn unlike(&self, _target: &Target) -> Result<ServerCounts, GatewayError> {
        self.check()?;
        Ok(ServerCounts {
            liked: Some(false),
            ..Default::default()
        })
    }

    fn comment(
        &self,
        target: &Target,
        content: &str,
    ) -> Result<(nhost::Comment, ServerCounts), GatewayError> {
        self.check()?;
        Ok((
            nhost::Comment {
                id: format!("{}-local", target.id),
                post_id: Some(target.id.clone()),
                user_id: "mock".into(),
                content: content.to_string(),
                created_at: Some(chrono::Utc::now()),
                user: Some(mock_profile("you")),
            },
            ServerCounts::default(),
        ))
    }

    fn share(&self, _target: &Target) -> Result<ServerCounts, GatewayError> {
        self.check()?;
        Ok(ServerCounts::default())
    }
}

#[derive(Default)]
pub struct MockProfileService;

impl ProfileService for MockProfileService {
    fn load_profile(&self, user_id: &str) -> Result<Option<nhost::Profile>> {
        Ok(Some(nhost::Profile {
            id: user_id.to_string(),
            ..mock_profile("offline")
        }))
    }
}

fn mock_profile(username: &str) -> nhost::Profile {
    nhost::Profile {
        id: format!("mock-{username}"),
        username: username.to_string(),
        full_name: None,
        avatar_url: None,
        bio: None,
    }
}

fn aggregate(count: u64) -> nhost::Aggregate {
    nhost::Aggregate {
        aggregate: Some(nhost::AggregateCount { count }),
    }
}

fn mock_posts() -> Vec<nhost::Post> {
    vec![
        nhost::Post {
            id: "welcome".into(),
            user_id: "mock-reelgram".into(),
            caption: Some(
                "Welcome to reelgram. Use h/l to flip through gallery images and L to like.".into(),
            ),
            image_url: Some(
                r#"["https://picsum.photos/id/10/1080/1080","https://picsum.photos/id/11/1080/1080","https://picsum.photos/id/12/1080/1080"]"#
                    .into(),
            ),
            media_type: Some("image".into()),
            created_at: None,
            user: Some(mock_profile("reelgram")),
            likes_count: aggregate(128),
            comments_count: aggregate(4),
            shares_count: aggregate(2),
            liked_by_me: Vec::new(),
        },
        nhost::Post {
            id: "shortcuts".into(),
            user_id: "mock-reelgram".into(),
            caption: Some("Press c to comment, s to share, o to open the image.".into()),
            image_url: Some("https://picsum.photos/id/20/1080/1080".into()),
            media_type: Some("image".into()),
            created_at: None,
            user: Some(mock_profile("reelgram")),
            likes_count: aggregate(12),
            comments_count: aggregate(0),
            shares_count: aggregate(0),
            liked_by_me: Vec::new(),
        },
    ]
}

fn mock_reels() -> Vec<nhost::Reel> {
    (1..=3)
        .map(|idx| nhost::Reel {
            id: format!("reel-{idx}"),
            user_id: "mock-reelgram".into(),
            caption: Some(format!("Sample reel {idx}. Scroll or drag to move between reels.")),
            video_url: Some(format!("https://example.com/reels/{idx}.mp4")),
            music_title: Some("Offline Mix".into()),
            music_artist: Some("reelgram".into()),
            created_at: None,
            user: Some(mock_profile("reelgram")),
            likes_count: aggregate(idx * 10),
            comments_count: aggregate(idx),
            shares_count: aggregate(0),
            liked_by_me: Vec::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_out_interactions_short_circuit() {
        let client = Arc::new(
            nhost::Client::new(nhost::ClientConfig {
                endpoint: Some("http://127.0.0.1:9/v1/graphql".into()),
                user_agent: "reelgram-test".into(),
                ..Default::default()
            })
            .unwrap(),
        );
        let service = NhostInteractionService::new(client, Arc::new(session::Manager::new()));
        let err = service.like(&Target::post("p1")).unwrap_err();
        assert!(matches!(err, GatewayError::NotSignedIn));
    }

    #[test]
    fn mock_feed_contains_a_gallery() {
        let posts = MockFeedService.load_posts().unwrap();
        assert!(posts
            .iter()
            .any(|post| post.media().kind == crate::media::MediaKind::Gallery));
        assert_eq!(MockFeedService.load_reels().unwrap().len(), 3);
    }

    #[test]
    fn failing_mock_recovers_after_budget() {
        let service = MockInteractionService::failing(1);
        assert!(service.share(&Target::post("p")).is_err());
        assert!(service.share(&Target::post("p")).is_ok());
    }
}
