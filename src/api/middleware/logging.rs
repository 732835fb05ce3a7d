use actix_web::middleware::Next;
use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    Error,
};
use std::time::Instant;

/// Polled by the UI on every refresh; kept out of the info log
fn is_poll_path(path: &str) -> bool {
    path.ends_with("/health") || path.ends_with("/migration")
}

/// Logs each request with its status and latency
pub async fn request_logger(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.path().to_string();
    let remote_addr = req
        .connection_info()
        .realip_remote_addr()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let quiet = method == actix_web::http::Method::GET && is_poll_path(&path);

    if quiet {
        tracing::debug!("--> {} {} (from: {})", method, path, remote_addr);
    } else {
        tracing::info!("--> {} {} (from: {})", method, path, remote_addr);
    }

    let res = next.call(req).await?;

    let elapsed = start.elapsed().as_millis();
    let status = res.status();

    if status.is_client_error() || status.is_server_error() {
        tracing::warn!("<-- {} {} {} ({}ms)", method, path, status.as_u16(), elapsed);
    } else if quiet {
        tracing::debug!("<-- {} {} {} ({}ms)", method, path, status.as_u16(), elapsed);
    } else {
        tracing::info!("<-- {} {} {} ({}ms)", method, path, status.as_u16(), elapsed);
    }

    Ok(res)
}
