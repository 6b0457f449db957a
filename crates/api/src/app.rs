use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use dashmap::DashMap;
use domain::services::{
    Clock, FanOutHub, GroupService, InMemoryStore, LocationStore, MembershipStore, StoreError,
    TrackingPolicy, TrackingService, UserDirectory,
};
use persistence::{LocationRepository, MembershipRepository, UserRepository};
use shared::jwt::{JwtConfig, JwtError};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{
    chronological, group_locations, groups, health, locations, realtime, settings, timeline,
};

/// The three stores behind the services, from one backend.
#[derive(Clone)]
pub struct Stores {
    pub locations: Arc<dyn LocationStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl Stores {
    /// Process-memory stores sharing one state.
    pub fn memory(clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(InMemoryStore::new(clock));
        Self {
            locations: store.clone(),
            memberships: store.clone(),
            users: store,
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            locations: Arc::new(LocationRepository::new(pool.clone())),
            memberships: Arc::new(MembershipRepository::new(pool.clone())),
            users: Arc::new(UserRepository::new(pool)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tracking: Arc<TrackingService>,
    pub groups: Arc<GroupService>,
    pub users: Arc<dyn UserDirectory>,
    pub hub: Arc<FanOutHub>,
    pub jwt: Arc<JwtConfig>,
    /// Present only with the PostgreSQL backend.
    pub pool: Option<PgPool>,
    /// Id/username pairs already registered in the user directory.
    known_users: Arc<DashMap<Uuid, String>>,
}

impl AppState {
    pub fn new(
        config: Config,
        stores: Stores,
        clock: Arc<dyn Clock>,
        pool: Option<PgPool>,
    ) -> Result<Self, JwtError> {
        let jwt = JwtConfig::new(
            &config.jwt.secret,
            config.jwt.access_token_expiry_secs,
            config.jwt.leeway_secs,
        )?;
        let hub = Arc::new(FanOutHub::new(config.realtime.channel_capacity));

        let policy = TrackingPolicy {
            default_threshold_minutes: config.liveness.default_threshold_minutes,
            allow_anonymous_public_timeline: config.visibility.allow_anonymous_public_timeline,
            max_group_query_subjects: config.limits.max_group_query_user_ids,
        };

        let tracking = TrackingService::new(
            stores.locations.clone(),
            stores.memberships.clone(),
            stores.users.clone(),
            clock.clone(),
            hub.clone(),
            policy,
        );
        let groups = GroupService::new(
            stores.memberships.clone(),
            stores.users.clone(),
            clock,
            hub.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            tracking: Arc::new(tracking),
            groups: Arc::new(groups),
            users: stores.users,
            hub,
            jwt: Arc::new(jwt),
            pool,
            known_users: Arc::new(DashMap::new()),
        })
    }

    /// Records a verified token identity in the user directory once per
    /// process, or again if its username changed.
    pub async fn register_caller(&self, user_id: Uuid, username: &str) -> Result<(), StoreError> {
        let known = self
            .known_users
            .get(&user_id)
            .is_some_and(|entry| entry.value() == username);
        if known {
            return Ok(());
        }

        self.users.ensure_user(user_id, username).await?;
        self.known_users.insert(user_id, username.to_string());
        tracing::debug!(user_id = %user_id, username, "Registered caller");
        Ok(())
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // Authenticated through the `UserAuth` extractor on each handler.
    let api_routes = Router::new()
        // Own locations
        .route("/api/v1/locations", post(locations::create_location))
        .route("/api/v1/locations/:location_id", delete(locations::delete_location))
        .route("/api/v1/locations/bulk-delete", post(locations::bulk_delete))
        .route("/api/v1/locations/query", post(locations::query_viewport))
        // Chronological views
        .route("/api/v1/chronological", get(chronological::get_chronological))
        .route("/api/v1/chronological/has-data", get(chronological::has_data))
        .route("/api/v1/chronological/stats", get(chronological::get_stats))
        .route(
            "/api/v1/chronological/nav-availability",
            get(chronological::nav_availability),
        )
        // Settings
        .route(
            "/api/v1/users/me/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        // Groups
        .route(
            "/api/v1/groups",
            post(groups::create_group).get(groups::list_groups),
        )
        .route("/api/v1/groups/:group_id/members", get(groups::list_members))
        .route(
            "/api/v1/groups/:group_id/members/:user_id",
            delete(groups::remove_member),
        )
        .route(
            "/api/v1/groups/:group_id/members/:user_id/org-peer-visibility-access",
            post(groups::set_peer_visibility),
        )
        .route(
            "/api/v1/groups/:group_id/invitations",
            post(groups::create_invitation),
        )
        .route(
            "/api/v1/groups/:group_id/invitations/:invitation_id",
            delete(groups::revoke_invitation),
        )
        .route("/api/v1/invitations", get(groups::list_invitations))
        .route(
            "/api/v1/invitations/:invitation_id/accept",
            post(groups::accept_invitation),
        )
        .route(
            "/api/v1/invitations/:invitation_id/decline",
            post(groups::decline_invitation),
        )
        // Group map
        .route(
            "/api/v1/groups/:group_id/locations/latest",
            post(group_locations::latest_locations),
        )
        .route(
            "/api/v1/groups/:group_id/locations/query",
            post(group_locations::query_viewport),
        )
        // Realtime
        .route(
            "/api/v1/sse/stream/location-update/:username",
            get(realtime::location_stream),
        )
        .route("/api/v1/sse/group/:group_id", get(realtime::group_stream))
        .route("/api/v1/sse/membership", get(realtime::membership_stream));

    // Optional authentication
    let public_routes = Router::new()
        .route(
            "/api/v1/public/timeline/:username",
            get(timeline::public_timeline),
        )
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors_layer(&config))
        .with_state(state)
}
