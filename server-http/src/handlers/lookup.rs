use crate::api::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{Uri, header};
use axum::response::IntoResponse;
use icp_cache::QueryOutcome;
use shared::Error;
use tracing::info;

const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const CACHE_CONTROL: &str = "public, max-age=60";

/// Domain names are restricted to ASCII letters, digits, dots and hyphens.
pub fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
}

/// GET /{domain}
///
/// The domain is checked on the raw request path, so percent-encoded
/// segments never reach upstream.
pub async fn lookup_domain(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<impl IntoResponse, ApiError> {
    let domain = uri.path().strip_prefix('/').unwrap_or_default();
    if !is_valid_domain(domain) {
        return Err(ApiError(Error::NotFound));
    }

    info!("LOOKUP: domain={}", domain);

    let record = state.resolver.resolve(domain, state.deadline).await?;
    let body = QueryOutcome::Result(record).encode()?;

    Ok((
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CACHE_CONTROL, CACHE_CONTROL),
        ],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_validation() {
        assert!(is_valid_domain("example.com"));
        assert!(is_valid_domain("sub-domain.Example.cn"));
        assert!(is_valid_domain("123.net"));

        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("under_score.com"));
        assert!(!is_valid_domain("space here.com"));
        assert!(!is_valid_domain("例子.中国"));
        assert!(!is_valid_domain("exa%6Dple.com"));
    }
}
