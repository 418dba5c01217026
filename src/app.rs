use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{self, Config};
use crate::data;
use crate::feed::{FeedKind, FeedState, Services};
use crate::logging;
use crate::nhost;
use crate::player::ExternalPlayer;
use crate::reel::{Player, SilentPlayer, SwipeController};
use crate::session;
use crate::ui;

pub fn run(offline: bool) -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let _log_guard = logging::init(&cfg.logging).context("initialise logging")?;
    let display_path = friendly_path(config::default_path().as_ref());

    if cfg.ui.theme != "default" {
        tracing::warn!(theme = %cfg.ui.theme, "unknown theme, using default");
    }

    let session_manager = session::Manager::from_config(&cfg.session);

    let (services, status) = if offline || cfg.backend.graphql_url.trim().is_empty() {
        tracing::info!(offline, "using offline sample feed");
        (
            offline_services(),
            format!("Offline sample feed. Set backend.graphql_url in {display_path} to connect."),
        )
    } else {
        match remote_services(&cfg, &session_manager) {
            Ok((services, endpoint)) => (services, format!("Connected to {endpoint}.")),
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to set up backend client");
                (
                    offline_services(),
                    format!("Backend unavailable ({err}); showing the offline sample feed."),
                )
            }
        }
    };

    let player: Box<dyn Player> = if cfg.player.autoplay {
        Box::new(ExternalPlayer::new(&cfg.player))
    } else {
        Box::new(SilentPlayer)
    };
    let swipe = SwipeController::new(
        cfg.gestures.swipe_threshold_px,
        cfg.gestures.wheel_min_delta,
    );

    let feed = FeedState::new(
        services,
        session_manager,
        swipe,
        player,
        FeedKind::from_key(&cfg.ui.feed),
    );

    let mut model = ui::Model::new(ui::Options {
        feed,
        row_height_px: cfg.gestures.row_height_px,
        status_message: status,
    });
    model.run()?;

    tracing::info!("exiting");
    Ok(())
}

fn remote_services(
    cfg: &Config,
    session_manager: &Arc<session::Manager>,
) -> Result<(Services, String)> {
    let admin_secret = Some(cfg.backend.admin_secret.trim().to_string())
        .filter(|secret| !secret.is_empty());
    let client = nhost::Client::new(nhost::ClientConfig {
        endpoint: Some(cfg.backend.graphql_url.clone()),
        user_agent: cfg.backend.user_agent.clone(),
        admin_secret,
        timeout: Some(cfg.backend.timeout),
        http_client: None,
    })
    .context("create nhost client")?;
    if let Some(session) = session_manager.active() {
        client.set_access_token(session.access_token);
    }
    let client = Arc::new(client);
    let endpoint = client.endpoint().to_string();

    let services = Services {
        feed: Arc::new(
            data::NhostFeedService::new(client.clone(), session_manager.clone())
                .with_page_size(cfg.backend.page_size),
        ),
        comments: Arc::new(data::NhostCommentService::new(client.clone())),
        interactions: Arc::new(data::NhostInteractionService::new(
            client.clone(),
            session_manager.clone(),
        )),
        profiles: Arc::new(data::NhostProfileService::new(client)),
    };
    Ok((services, endpoint))
}

fn offline_services() -> Services {
    Services {
        feed: Arc::new(data::MockFeedService),
        comments: Arc::new(data::MockCommentService),
        interactions: Arc::new(data::MockInteractionService::default()),
        profiles: Arc::new(data::MockProfileService),
    }
}

fn friendly_path(path: Option<&std::path::PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/reelgram/config.yaml".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendly_path_falls_back_to_default_location() {
        assert_eq!(friendly_path(None), "~/.config/reelgram/config.yaml");
    }

    #[test]
    fn remote_services_use_configured_endpoint() {
        let mut cfg = Config::default();
        cfg.backend.graphql_url = "http://127.0.0.1:9/v1/graphql".into();
        let manager = Arc::new(session::Manager::new());
        let (_, endpoint) = remote_services(&cfg, &manager).unwrap();
        assert_eq!(endpoint, "http://127.0.0.1:9/v1/graphql");
    }

    #[test]
    fn remote_services_reject_bad_endpoint() {
        let mut cfg = Config::default();
        cfg.backend.graphql_url = "not a url".into();
        let manager = Arc::new(session::Manager::new());
        assert!(remote_services(&cfg, &manager).is_err());
    }
}
