mod config;
mod db;
mod llm;
mod rate_limit;
mod routes;
mod services;
mod state;
mod validation;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::services::image::Imaging;
use crate::services::image_store::{CloudinaryConfig, CloudinaryStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    // Non-fatal: AI routes answer 503 without a client.
    let clients = match llm::GeminiClients::from_env() {
        Ok(clients) => clients,
        Err(e) => {
            tracing::warn!(error = %e, "Gemini not configured, AI features disabled");
            llm::GeminiClients { text: None, imaging: None }
        }
    };
    let text: Option<Arc<dyn llm::TextModel>> = clients.text.map(|c| Arc::new(c) as Arc<dyn llm::TextModel>);
    if text.is_none() {
        tracing::warn!("no rotating Gemini keys, text AI features disabled");
    }

    let imaging = match (clients.imaging, CloudinaryConfig::from_env()) {
        (Some(paying), Some(cloudinary)) => match CloudinaryStore::new(cloudinary) {
            Ok(store) => {
                let paying = Arc::new(paying);
                Some(Imaging { prompter: paying.clone(), painter: paying, store: Arc::new(store) })
            }
            Err(e) => {
                tracing::warn!(error = %e, "image store not available, image generation disabled");
                None
            }
        },
        _ => {
            tracing::warn!("paying Gemini key or Cloudinary missing, image generation disabled");
            None
        }
    };

    let state = state::AppState::new(pool, text, imaging, state::AuthSettings::from_env());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "lectern listening");
    axum::serve(listener, app).await.expect("server failed");
}
