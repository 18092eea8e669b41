use crate::api::ApiError;
use axum::http::Method;
use shared::Error;

/// Unknown paths: 405 for anything but GET, 404 otherwise.
pub async fn not_found(method: Method) -> ApiError {
    if method == Method::GET {
        ApiError(Error::NotFound)
    } else {
        ApiError(Error::MethodNotAllowed)
    }
}

/// Known paths hit with a method other than GET.
pub async fn method_not_allowed() -> ApiError {
    ApiError(Error::MethodNotAllowed)
}
