mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, patch, post},
    Router,
};

use crate::api::{DynAPI, API};
use crate::server::handlers::{bookings, rides};

pub async fn serve<T: API + Sync + Send + 'static>(api: T) {
    let api = Arc::new(api) as DynAPI;

    let app = Router::new()
        .route("/rides", post(rides::create))
        .route("/rides/search", get(rides::search))
        .route("/rides/:id", get(rides::find))
        .route("/rides/:id/cancel", patch(rides::cancel))
        .route("/rides/:id/complete", patch(rides::complete))
        .route("/bookings", post(bookings::create))
        .route("/bookings/:id", get(bookings::find))
        .route("/bookings/:id/payment", patch(bookings::confirm_payment))
        .route("/bookings/:id/cancel", patch(bookings::cancel))
        .route("/bookings/:id/otp", post(bookings::request_otp))
        .route("/bookings/:id/complete", patch(bookings::complete))
        .layer(Extension(api));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
