use axum::http::StatusCode;
use nimproxy::error::AppError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nimproxy=debug")),
        )
        .json()
        .init();

    if let Err(err) = run().await {
        eprintln!("error: {}", err.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let state = nimproxy::app::load_state()?;
    let app = nimproxy::app::build_app(state.clone());
    let addr: std::net::SocketAddr =
        state
            .runtime
            .listen
            .parse()
            .map_err(|err: std::net::AddrParseError| {
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("invalid listen address {}: {err}", state.runtime.listen),
                )
            })?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("bind {addr} failed: {err}"),
        )
    })?;
    tracing::info!("nimproxy listening on {}", addr);
    axum::serve(listener, app).await.map_err(|err| {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("server error: {err}"),
        )
    })?;
    Ok(())
}
