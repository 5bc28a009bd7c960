pub mod countdown;
pub mod players;
pub mod session;
mod sse;
pub mod votes;

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    config::AppConfig,
    gateway::{
        Authorizer, MembershipSource, NotificationSink,
        directory::{ConfigAuthorizer, StaticDirectory},
        notifier::SseNotifier,
    },
    scheduler::{Scheduler, TokioScheduler},
    state::session::GameSession,
};

pub use self::sse::SseHub;

/// Handle on the process-wide state shared by routes, services and timers.
pub type SharedState = Arc<AppState>;
/// Per-scope session guarded by the lock every mutation and timer callback takes.
pub type SessionHandle = Arc<RwLock<GameSession>>;

const SSE_CAPACITY: usize = 64;

/// Identifier of the channel/guild context a game runs in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ScopeId(pub String);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ScopeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// External services the game logic talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Source of role holders used to seed a game.
    pub membership: Arc<dyn MembershipSource>,
    /// Moderator check for privileged commands.
    pub authorizer: Arc<dyn Authorizer>,
    /// Destination of acknowledgements and countdown notices.
    pub notifier: Arc<dyn NotificationSink>,
    /// Timer primitive driving countdowns.
    pub scheduler: Arc<dyn Scheduler>,
}

impl Collaborators {
    /// Directory, authorizer and scheduler derived from `config`, with the given notifier.
    pub fn from_config(config: &AppConfig, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            membership: Arc::new(StaticDirectory::from_config(config)),
            authorizer: Arc::new(ConfigAuthorizer::from_config(config)),
            notifier,
            scheduler: Arc::new(TokioScheduler::new()),
        }
    }
}

/// Process-wide state: configuration, collaborators and the live sessions keyed by scope.
pub struct AppState {
    config: AppConfig,
    player_role: RwLock<String>,
    sessions: DashMap<ScopeId, SessionHandle>,
    sse: SseHub,
    collaborators: Collaborators,
}

impl AppState {
    /// Build the state with the default collaborators, publishing notices on the SSE hub.
    pub fn new(config: AppConfig) -> SharedState {
        let sse = SseHub::new(SSE_CAPACITY);
        let notifier = Arc::new(SseNotifier::new(sse.clone()));
        let collaborators = Collaborators::from_config(&config, notifier);
        Self::assemble(config, sse, collaborators)
    }

    /// Build the state around caller-provided collaborators.
    pub fn with_collaborators(config: AppConfig, collaborators: Collaborators) -> SharedState {
        Self::assemble(config, SseHub::new(SSE_CAPACITY), collaborators)
    }

    fn assemble(config: AppConfig, sse: SseHub, collaborators: Collaborators) -> SharedState {
        let player_role = RwLock::new(config.player_role_name().to_string());
        Arc::new(Self {
            config,
            player_role,
            sessions: DashMap::new(),
            sse,
            collaborators,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Name of the role identifying players, as last set by `setrole`.
    pub async fn player_role(&self) -> String {
        self.player_role.read().await.clone()
    }

    /// Replace the player role name used by the next `startgame`.
    pub async fn set_player_role(&self, role: String) {
        let mut guard = self.player_role.write().await;
        info!(previous = %*guard, next = %role, "player role updated");
        *guard = role;
    }

    /// Live sessions keyed by scope.
    pub fn sessions(&self) -> &DashMap<ScopeId, SessionHandle> {
        &self.sessions
    }

    /// Handle on the session running in `scope`, if any.
    pub fn session(&self, scope: &ScopeId) -> Option<SessionHandle> {
        self.sessions.get(scope).map(|entry| entry.value().clone())
    }

    /// Hub feeding the SSE routes.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Membership source collaborator.
    pub fn membership(&self) -> &Arc<dyn MembershipSource> {
        &self.collaborators.membership
    }

    /// Authorization collaborator.
    pub fn authorizer(&self) -> &Arc<dyn Authorizer> {
        &self.collaborators.authorizer
    }

    /// Notification sink collaborator.
    pub fn notifier(&self) -> &Arc<dyn NotificationSink> {
        &self.collaborators.notifier
    }

    /// Timer collaborator.
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.collaborators.scheduler
    }

    /// Stop arming timers and drop the pending ones.
    pub fn shutdown(&self) {
        self.collaborators.scheduler.shutdown();
    }
}
