use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use url::Url;

use crate::engagement::{EngagementCounters, ServerCounts};
use crate::media::{self, MediaKind, MediaRef};

pub const DEFAULT_GRAPHQL_URL: &str = "http://localhost:1337/v1/graphql";
pub const ADMIN_SECRET_HEADER: &str = "x-hasura-admin-secret";

/// Stand-in viewer id for anonymous reads so `liked_by_me` matches nothing.
const ANONYMOUS_VIEWER: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("sign in to do that")]
    NotSignedIn,
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend rejected request: {}", .0.join("; "))]
    Graphql(Vec<String>),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Status { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub endpoint: Option<String>,
    pub user_agent: String,
    pub admin_secret: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorEntry {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Reel,
}

impl TargetKind {
    fn column(&self) -> &'static str {
        match self {
            TargetKind::Post => "post_id",
            TargetKind::Reel => "reel_id",
        }
    }

    fn relation(&self) -> &'static str {
        match self {
            TargetKind::Post => "post",
            TargetKind::Reel => "reel",
        }
    }

    fn table(&self, base: &str) -> String {
        match self {
            TargetKind::Post => base.to_string(),
            TargetKind::Reel => format!("reel_{base}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    pub id: String,
}

impl Target {
    pub fn post(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Post,
            id: id.into(),
        }
    }

    pub fn reel(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Reel,
            id: id.into(),
        }
    }

    /// Unique across posts and reels, which live in separate tables.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind.relation(), self.id)
    }
}

pub struct Client {
    http: HttpClient,
    endpoint: Url,
    user_agent: String,
    admin_secret: Option<String>,
    access_token: RwLock<Option<String>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("nhost client user agent required");
        }
        let endpoint = config
            .endpoint
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GRAPHQL_URL.to_string());
        let endpoint = Url::parse(&endpoint)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            endpoint,
            user_agent: config.user_agent,
            admin_secret: config.admin_secret.filter(|secret| !secret.is_empty()),
            access_token: RwLock::new(None),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token.filter(|token| !token.trim().is_empty());
    }

    pub fn execute<T>(&self, query: &str, variables: Map<String, Value>) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
    {
        let mut req = self
            .http
            .post(self.endpoint.clone())
            .header(USER_AGENT, self.user_agent.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(&GraphqlRequest {
                query,
                variables: &variables,
            });
        if let Some(token) = self.access_token.read().as_ref() {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        } else if let Some(secret) = self.admin_secret.as_ref() {
            req = req.header(ADMIN_SECRET_HEADER, secret.clone());
        }

        let resp = req.send()?;
        let status = resp.status();
        let body = resp.text()?;
        let payload = serde_json::from_str::<GraphqlResponse>(&body);

        if let Ok(payload) = &payload {
            if !payload.errors.is_empty() {
                let messages = payload
                    .errors
                    .iter()
                    .map(|err| err.message.clone())
                    .collect::<Vec<_>>();
                tracing::warn!(?messages, status = status.as_u16(), "graphql errors");
                return Err(GatewayError::Graphql(messages));
            }
        }
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data = payload
            .map_err(|err| GatewayError::Decode(err.to_string()))?
            .data
            .ok_or_else(|| GatewayError::Decode("response has no data".into()))?;
        serde_json::from_value(data).map_err(|err| GatewayError::Decode(err.to_string()))
    }

    pub fn posts(&self, limit: u32, viewer: Option<&str>) -> Result<Vec<Post>, GatewayError> {
        #[derive(Deserialize)]
        struct Data {
            posts: Vec<Post>,
        }
        let data: Data = self.execute(POSTS_QUERY, feed_variables(limit, viewer))?;
        Ok(data.posts)
    }

    pub fn reels(&self, limit: u32, viewer: Option<&str>) -> Result<Vec<Reel>, GatewayError> {
        #[derive(Deserialize)]
        struct Data {
            reels: Vec<Reel>,
        }
        let data: Data = self.execute(REELS_QUERY, feed_variables(limit, viewer))?;
        Ok(data.reels)
    }

    pub fn comments(&self, target: &Target) -> Result<Vec<Comment>, GatewayError> {
        let table = target.kind.table("comments");
        let query = format!(
            "query Comments($target: uuid!) {{
  result: {table}(where: {{{column}: {{_eq: $target}}}}, order_by: {{created_at: asc}}) {{
    id {column} user_id content created_at
    user {{ {profile} }}
  }}
}}",
            column = target.kind.column(),
            profile = PROFILE_FIELDS,
        );
        let data: Rows<Comment> = self.execute(&query, vars([("target", json!(target.id))]))?;
        Ok(data.result)
    }

    pub fn like(&self, target: &Target, user_id: &str) -> Result<ServerCounts, GatewayError> {
        let table = target.kind.table("likes");
        let query = format!(
            "mutation Like($target: uuid!, $user_id: uuid!) {{
  result: insert_{table}_one(object: {{{column}: $target, user_id: $user_id}}) {{
    target: {relation} {{ count: {table}_aggregate {{ aggregate {{ count }} }} }}
  }}
}}",
            column = target.kind.column(),
            relation = target.kind.relation(),
        );
        let data: Inserted = self.execute(
            &query,
            vars([("target", json!(target.id)), ("user_id", json!(user_id))]),
        )?;
        Ok(ServerCounts {
            likes: data.count(),
            liked: Some(true),
            ..Default::default()
        })
    }

    pub fn unlike(&self, target: &Target, user_id: &str) -> Result<ServerCounts, GatewayError> {
        let table = target.kind.table("likes");
        let query = format!(
            "mutation Unlike($target: uuid!, $user_id: uuid!) {{
  result: delete_{table}(where: {{{column}: {{_eq: $target}}, user_id: {{_eq: $user_id}}}}) {{
    affected_rows
  }}
}}",
            column = target.kind.column(),
        );
        let _: Value = self.execute(
            &query,
            vars([("target", json!(target.id)), ("user_id", json!(user_id))]),
        )?;
        Ok(ServerCounts {
            liked: Some(false),
            ..Default::default()
        })
    }

    pub fn comment(
        &self,
        target: &Target,
        user_id: &str,
        content: &str,
    ) -> Result<(Comment, ServerCounts), GatewayError> {
        let table = target.kind.table("comments");
        let query = format!(
            "mutation Comment($target: uuid!, $user_id: uuid!, $content: String!) {{
  result: insert_{table}_one(object: {{{column}: $target, user_id: $user_id, content: $content}}) {{
    id {column} user_id content created_at
    user {{ {profile} }}
    target: {relation} {{ count: {table}_aggregate {{ aggregate {{ count }} }} }}
  }}
}}",
            column = target.kind.column(),
            relation = target.kind.relation(),
            profile = PROFILE_FIELDS,
        );
        #[derive(Deserialize)]
        struct Data {
            result: CommentInsert,
        }
        #[derive(Deserialize)]
        struct CommentInsert {
            #[serde(flatten)]
            comment: Comment,
            #[serde(default)]
            target: Option<CountHolder>,
        }
        let data: Data = self.execute(
            &query,
            vars([
                ("target", json!(target.id)),
                ("user_id", json!(user_id)),
                ("content", json!(content)),
            ]),
        )?;
        let counts = ServerCounts {
            comments: data.result.target.map(|holder| holder.count.count()),
            ..Default::default()
        };
        Ok((data.result.comment, counts))
    }

    pub fn share(&self, target: &Target, user_id: &str) -> Result<ServerCounts, GatewayError> {
        let table = target.kind.table("shares");
        let query = format!(
            "mutation Share($target: uuid!, $user_id: uuid!) {{
  result: insert_{table}_one(object: {{{column}: $target, user_id: $user_id}}) {{
    target: {relation} {{ count: {table}_aggregate {{ aggregate {{ count }} }} }}
  }}
}}",
            column = target.kind.column(),
            relation = target.kind.relation(),
        );
        let data: Inserted = self.execute(
            &query,
            vars([("target", json!(target.id)), ("user_id", json!(user_id))]),
        )?;
        Ok(ServerCounts {
            shares: data.count(),
            ..Default::default()
        })
    }

    pub fn profile(&self, user_id: &str) -> Result<Option<Profile>, GatewayError> {
        #[derive(Deserialize)]
        struct Data {
            profile: Option<Profile>,
        }
        let data: Data = self.execute(PROFILE_QUERY, vars([("id", json!(user_id))]))?;
        Ok(data.profile)
    }
}

fn vars<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn feed_variables(limit: u32, viewer: Option<&str>) -> Map<String, Value> {
    vars([
        ("limit", json!(limit)),
        ("viewer", json!(viewer.unwrap_or(ANONYMOUS_VIEWER))),
    ])
}

const PROFILE_FIELDS: &str = "id username full_name avatar_url bio";

const POSTS_QUERY: &str = "query Posts($limit: Int!, $viewer: uuid!) {
  posts(order_by: {created_at: desc}, limit: $limit) {
    id user_id caption image_url media_type created_at
    user { id username full_name avatar_url bio }
    likes_count: likes_aggregate { aggregate { count } }
    comments_count: comments_aggregate { aggregate { count } }
    shares_count: shares_aggregate { aggregate { count } }
    liked_by_me: likes(where: {user_id: {_eq: $viewer}}) { user_id }
  }
}";

const REELS_QUERY: &str = "query Reels($limit: Int!, $viewer: uuid!) {
  reels(order_by: {created_at: desc}, limit: $limit) {
    id user_id caption video_url music_title music_artist created_at
    user { id username full_name avatar_url bio }
    likes_count: reel_likes_aggregate { aggregate { count } }
    comments_count: reel_comments_aggregate { aggregate { count } }
    shares_count: reel_shares_aggregate { aggregate { count } }
    liked_by_me: reel_likes(where: {user_id: {_eq: $viewer}}) { user_id }
  }
}";

const PROFILE_QUERY: &str = "query Profile($id: uuid!) {
  profile: profiles_by_pk(id: $id) { id username full_name avatar_url bio }
}";

#[derive(Debug, Deserialize)]
struct Rows<T> {
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Inserted {
    result: Option<InsertedRow>,
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
    #[serde(default)]
    target: Option<CountHolder>,
}

#[derive(Debug, Deserialize)]
struct CountHolder {
    count: Aggregate,
}

impl Inserted {
    fn count(&self) -> Option<u64> {
        self.result
            .as_ref()
            .and_then(|row| row.target.as_ref())
            .map(|holder| holder.count.count())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Aggregate {
    #[serde(default)]
    pub aggregate: Option<AggregateCount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateCount {
    #[serde(default)]
    pub count: u64,
}

impl Aggregate {
    pub fn count(&self) -> u64 {
        self.aggregate.as_ref().map(|agg| agg.count).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewerLike {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<Profile>,
    #[serde(default)]
    pub likes_count: Aggregate,
    #[serde(default)]
    pub comments_count: Aggregate,
    #[serde(default)]
    pub shares_count: Aggregate,
    #[serde(default)]
    pub liked_by_me: Vec<ViewerLike>,
}

impl Post {
    pub fn media(&self) -> MediaRef {
        media::normalize_as(
            self.image_url.as_deref(),
            MediaKind::from_media_type(self.media_type.as_deref()),
        )
    }

    pub fn counters(&self) -> EngagementCounters {
        EngagementCounters {
            like_count: self.likes_count.count(),
            comment_count: self.comments_count.count(),
            share_count: self.shares_count.count(),
            liked: !self.liked_by_me.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reel {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub music_title: Option<String>,
    #[serde(default)]
    pub music_artist: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<Profile>,
    #[serde(default)]
    pub likes_count: Aggregate,
    #[serde(default)]
    pub comments_count: Aggregate,
    #[serde(default)]
    pub shares_count: Aggregate,
    #[serde(default)]
    pub liked_by_me: Vec<ViewerLike>,
}

impl Reel {
    pub fn media(&self) -> MediaRef {
        media::normalize_as(self.video_url.as_deref(), MediaKind::Video)
    }

    pub fn music(&self) -> Option<String> {
        let title = self.music_title.as_deref().filter(|t| !t.trim().is_empty())?;
        Some(match self.music_artist.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(artist) => format!("{title} · {artist}"),
            None => title.to_string(),
        })
    }

    pub fn counters(&self) -> EngagementCounters {
        EngagementCounters {
            like_count: self.likes_count.count(),
            comment_count: self.comments_count.count(),
            share_count: self.shares_count.count(),
            liked: !self.liked_by_me.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    /// Owning post or reel; reel comments carry `reel_id` instead.
    #[serde(default, alias = "reel_id")]
    pub post_id: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<Profile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::thread;
    use tiny_http::{Header, Response, Server};

    fn serve_once(status: u16, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let server = Server::http("127.0.0.1:0").expect("bind test server");
        let addr = server
            .server_addr()
            .to_ip()
            .expect("test server has ip address");
        let handle = thread::spawn(move || {
            let mut request = server.recv().expect("receive request");
            let mut received = String::new();
            request
                .as_reader()
                .read_to_string(&mut received)
                .expect("read body");
            let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                .expect("header");
            request
                .respond(
                    Response::from_string(body)
                        .with_status_code(status)
                        .with_header(header),
                )
                .expect("respond");
            received
        });
        (format!("http://{addr}/v1/graphql"), handle)
    }

    fn client(endpoint: String) -> Client {
        Client::new(ClientConfig {
            endpoint: Some(endpoint),
            user_agent: "reelgram-test".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_blank_user_agent() {
        assert!(Client::new(ClientConfig::default()).is_err());
    }

    #[test]
    fn errors_array_fails_even_with_http_200() {
        let (endpoint, server) = serve_once(
            200,
            r#"{"data":null,"errors":[{"message":"field 'posts' not found"}]}"#,
        );
        let err = client(endpoint).posts(10, None).unwrap_err();
        match err {
            GatewayError::Graphql(messages) => {
                assert_eq!(messages, vec!["field 'posts' not found".to_string()])
            }
            other => panic!("unexpected error {other:?}"),
        }
        let body = server.join().unwrap();
        assert!(body.contains("query Posts"));
        assert!(body.contains(ANONYMOUS_VIEWER));
    }

    #[test]
    fn http_failure_without_errors_is_transport_class() {
        let (endpoint, server) = serve_once(502, "bad gateway");
        let err = client(endpoint).posts(10, None).unwrap_err();
        assert!(err.is_transport());
        server.join().unwrap();
    }

    #[test]
    fn decodes_posts_with_aggregates() {
        let (endpoint, server) = serve_once(
            200,
            r#"{"data":{"posts":[{
                "id":"p1","user_id":"u1","caption":"hi",
                "image_url":"[\"https://a/1.jpg\",\"https://a/2.jpg\"]",
                "media_type":"image","created_at":"2024-03-01T10:00:00Z",
                "user":{"id":"u1","username":"ana"},
                "likes_count":{"aggregate":{"count":5}},
                "comments_count":{"aggregate":{"count":2}},
                "shares_count":{"aggregate":null},
                "liked_by_me":[{"user_id":"me"}]
            }]}}"#,
        );
        let posts = client(endpoint).posts(10, Some("me")).unwrap();
        server.join().unwrap();
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.media().kind, MediaKind::Gallery);
        let counters = post.counters();
        assert_eq!(counters.like_count, 5);
        assert_eq!(counters.comment_count, 2);
        assert_eq!(counters.share_count, 0);
        assert!(counters.liked);
    }

    #[test]
    fn like_reports_server_count() {
        let (endpoint, server) = serve_once(
            200,
            r#"{"data":{"result":{"target":{"count":{"aggregate":{"count":12}}}}}}"#,
        );
        let counts = client(endpoint).like(&Target::reel("r1"), "u1").unwrap();
        let body = server.join().unwrap();
        assert!(body.contains("insert_reel_likes_one"));
        assert_eq!(counts.likes, Some(12));
        assert_eq!(counts.liked, Some(true));
    }

    #[test]
    fn reel_music_label_combines_title_and_artist() {
        let reel = Reel {
            music_title: Some("Song".into()),
            music_artist: Some("Band".into()),
            ..Default::default()
        };
        assert_eq!(reel.music().as_deref(), Some("Song · Band"));
        assert_eq!(Reel::default().music(), None);
    }
}
