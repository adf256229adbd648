//! API Server Module
//!
//! Serves the Safe transaction history over HTTP. Every route lives under
//! `/api/v1`.

use super::handlers;
use crate::balances::BalanceService;
use crate::config::Config;
use crate::store::Database;
use crate::validation::Validator;
use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const API_PREFIX: &str = "/api/v1";

/// Shared application state that is accessible across all request handlers
///
/// - `db`: Indexed Safe data and stored submissions
/// - `validator`: Checks multisig transaction proposals
/// - `balances`: Balance lookups for registered Safes
/// - `config`: Pagination defaults and the settings echoed by `/about/`
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub validator: Arc<Validator>,
    pub balances: Arc<dyn BalanceService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, db: Database, balances: Arc<dyn BalanceService>) -> Self {
        // The validator reads Safe status from the same store
        let validator = Arc::new(Validator::new(db.clone()));
        Self {
            db,
            validator,
            balances,
            config: Arc::new(config),
        }
    }
}

/// Builds the service router with its state
pub fn router(state: AppState) -> Router {
    // Create the router with every endpoint relative to the API prefix
    let routes = Router::new()
        .route("/about/", get(handlers::about))
        .route(
            "/safes/:address/transactions/",
            get(handlers::list_multisig_transactions).post(handlers::create_multisig_transaction),
        )
        .route(
            "/safes/:address/incoming-transactions/",
            get(handlers::list_incoming_transactions),
        )
        .route(
            "/safes/:address/module-transactions/",
            get(handlers::list_module_transactions),
        )
        .route("/safes/:address/creation/", get(handlers::safe_creation))
        .route("/safes/:address/balances/", get(handlers::balances))
        .route("/safes/:address/balances/usd/", get(handlers::usd_balances))
        .route("/transactions/:safe_tx_hash/", get(handlers::multisig_transaction))
        .route("/owners/:address/", get(handlers::owner_safes));

    // Nest under the prefix and log each request
    Router::new()
        .nest(API_PREFIX, routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The main API server struct
pub struct Server {
    config: Arc<Config>,
    state: AppState,
}

impl Server {
    /// Creates a new API server instance
    ///
    /// # Arguments
    /// * `config` - Server configuration (host, port, pagination, etc.)
    /// * `db` - Connected store
    /// * `balances` - Balance service used by the balance endpoints
    pub fn new(config: Config, db: Database, balances: Arc<dyn BalanceService>) -> Self {
        // Build the shared state and keep a handle on its config
        let state = AppState::new(config, db, balances);
        Self {
            config: state.config.clone(),
            state,
        }
    }

    /// Binds the configured host and port and serves requests until shutdown
    pub async fn start(self) -> anyhow::Result<()> {
        // Create the router with the shared state
        let app = router(self.state);

        // Bind to the TCP address from the configuration
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);
        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        // Start serving requests
        axum::serve(listener, app).await?;

        Ok(())
    }
}
