//! HTTP surface: link check/redeem routes, health and the `OpenAPI` UI.

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::get,
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;
pub mod settings;
mod state;
pub mod types;

pub use openapi::openapi;
pub use settings::{LogSettingsSink, SettingsSink};
pub use state::OnboardState;

/// Build the application router.
/// # Errors
/// Returns an error if the frontend base URL has no usable origin
pub fn router(state: Arc<OnboardState>) -> Result<Router> {
    let frontend_origin = frontend_origin(state.frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin));

    let app = Router::new()
        .route(
            "/onboard/:token",
            get(handlers::check_onboarding).post(handlers::redeem_onboarding),
        )
        .route(
            "/settings/:token",
            get(handlers::check_settings).post(handlers::redeem_settings),
        )
        .route("/health", get(handlers::health).options(handlers::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        );

    Ok(app)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<OnboardState>) -> Result<()> {
    let app = router(state)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
                return;
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

// Paths carry the token, so spans record the matched route only.
fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or("unmatched", MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &Url) -> Result<HeaderValue> {
    let host = frontend_base_url.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = frontend_base_url
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", frontend_base_url.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redemption::MemoryTokenStore;
    use crate::token::{SigningKey, TokenVerifier};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn state(frontend: &str) -> Result<Arc<OnboardState>> {
        Ok(Arc::new(OnboardState::new(
            TokenVerifier::new(Arc::new(SigningKey::new(vec![2u8; 32])?)),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(LogSettingsSink),
            Url::parse(frontend)?,
        )))
    }

    #[test]
    fn frontend_origin_drops_path() -> Result<()> {
        let origin = frontend_origin(&Url::parse("https://app.onboard.dev:8443/setup/")?)?;
        assert_eq!(origin, "https://app.onboard.dev:8443");
        let origin = frontend_origin(&Url::parse("http://localhost/")?)?;
        assert_eq!(origin, "http://localhost");
        Ok(())
    }

    #[test]
    fn frontend_origin_requires_host() -> Result<()> {
        assert!(frontend_origin(&Url::parse("data:text/plain,hello")?).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn request_id_is_generated_and_propagated() -> Result<()> {
        let app = router(state("http://localhost:5173")?)?;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(Ulid::from_string(request_id).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn garbage_token_is_unauthorized() -> Result<()> {
        let app = router(state("http://localhost:5173")?)?;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/onboard/not-a-token")
                    .header("x-request-id", "req-1")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-request-id").map(HeaderValue::as_bytes),
            Some(b"req-1".as_slice())
        );
        Ok(())
    }
}
