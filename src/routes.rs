//! HTTP surface: one route table, with optional routes switched by configuration.

mod accounts;
mod catalog;
mod host;

use std::{net::Ipv4Addr, sync::Arc};

use axum::{
    Router,
    http::{HeaderValue, Method, header::CACHE_CONTROL},
    routing::{get, post},
};
use log::{debug, info};
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
};

use crate::{
    accounts::UserStore,
    config::Config,
    dataset::DatasetMaterializer,
    error::Result,
    images::ImageResolver,
    network::local_ipv4,
    storage::SharedObjectStore,
};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub datasets: DatasetMaterializer,
    pub images: ImageResolver,
    /// Present only when accounts are enabled.
    pub users: Option<UserStore>,
    /// Address reported by `/api/ip`.
    pub host: Ipv4Addr,
}

impl AppState {
    /// Wire the pipeline components to `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if accounts are enabled and the user store cannot be opened.
    pub fn new(config: Config, store: SharedObjectStore) -> Result<Self> {
        let users = if config.enable_accounts {
            Some(UserStore::open(&config.users_db)?)
        } else {
            None
        };

        Ok(Self {
            datasets: DatasetMaterializer::new(
                Arc::clone(&store),
                config.data_dir.clone(),
                config.retain_snapshots,
            ),
            images: ImageResolver::new(store),
            users,
            host: local_ipv4(),
            config: Arc::new(config),
        })
    }
}

/// Build the router for `state`.
pub fn router(state: AppState) -> Router {
    let mut routes = Router::new()
        .route("/api/ip", get(host::ip_handler))
        .route("/regions/{country}", get(catalog::regions_handler))
        .route("/countis/{country}", get(catalog::counties_handler))
        .route("/attractions/{country}", get(catalog::attractions_handler))
        .route("/attraction/{country}/{id}", get(catalog::attraction_handler));

    if state.config.enable_county_regions {
        debug!("Enabling county region route");
        routes = routes.route(
            "/regions/{country}/{county}",
            get(catalog::county_regions_handler),
        );
    }

    if state.users.is_some() {
        info!("Accounts enabled, serving /register and /login");
        routes = routes
            .route("/register", post(accounts::register_handler))
            .route("/login", post(accounts::login_handler));
    }

    let mut app = routes.layer(cors_layer());

    if let Some(value) = cache_control(state.config.cache_max_age) {
        app = app.layer(SetResponseHeaderLayer::overriding(CACHE_CONTROL, value));
    }

    app.with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_origin(AllowOrigin::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

fn cache_control(max_age: u64) -> Option<HeaderValue> {
    if max_age == 0 {
        return None;
    }
    HeaderValue::from_str(&format!("public, max-age={max_age}")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_header_can_be_disabled() {
        assert!(cache_control(0).is_none());
        assert_eq!(
            cache_control(315_360_000),
            Some(HeaderValue::from_static("public, max-age=315360000"))
        );
    }
}
