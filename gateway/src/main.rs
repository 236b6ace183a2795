use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing_subscriber::EnvFilter;

use deliberation_gateway::config::Config;
use deliberation_gateway::handlers;
use deliberation_gateway::state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let bind_addr = (config.http.host.clone(), config.http.port);
    tracing::info!(host = %bind_addr.0, port = bind_addr.1, backend = ?config.backend, "starting deliberation gateway");

    let state = web::Data::new(AppState::new(config));

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .route("/", web::get().to(handlers::health::health))
            .route("/topic_tree", web::post().to(handlers::topic_tree::topic_tree))
            .route("/claims", web::post().to(handlers::claims::claims))
            .route(
                "/sort_claims_tree/",
                web::put().to(handlers::sort_claims_tree::sort_claims_tree),
            )
            .route("/cruxes", web::post().to(handlers::cruxes::cruxes))
    })
    .bind(bind_addr)?
    .run()
    .await
}
