mod aggregator;
mod classifier;
mod config;
mod decoder;
mod pipeline;
mod routes;

use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::middleware::{ErrorHandlers, Logger};
use actix_web::{App, HttpServer, web};
use classifier::EmotionClassifier;
use config::ServiceConfig;
use pipeline::Pipeline;
use routes::{configure_routes, internal_error, not_found};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServiceConfig::load().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let model = classifier::load_backend(&config.model);
    let classifier = EmotionClassifier::new(model, &config.model, config.warmup.clone());
    let pipeline = web::Data::new(Pipeline::new(classifier, config.image.max_dimension));
    let service = web::Data::new(config.service.clone());

    let bind_address = config.bind_address();
    log::info!("🚀 Starting {} on {}", config.service.title, bind_address);

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(ErrorHandlers::new().handler(StatusCode::INTERNAL_SERVER_ERROR, internal_error))
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![actix_web::http::header::CONTENT_TYPE])
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .app_data(pipeline.clone())
            .app_data(service.clone())
            .configure(configure_routes)
            .default_service(web::to(not_found))
    });
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server.bind(&bind_address)?.run().await
}
