use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use videostore_infra::command_dispatcher::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    let status = match &err {
        DispatchError::Concurrency(_) | DispatchError::Conflict(_) => StatusCode::CONFLICT,
        DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
        DispatchError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchError::NotFound => StatusCode::NOT_FOUND,
        DispatchError::Deserialize(_) | DispatchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DispatchError::Publish(_) => StatusCode::BAD_GATEWAY,
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "command failed");
    } else {
        tracing::warn!(error = %err, status = status.as_u16(), "command rejected");
    }

    json_error(status, err.to_string())
}

/// A body that is not the JSON the endpoint expects is a bad request.
pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    let message = rejection.body_text();
    tracing::warn!(error = %message, "malformed request body");
    json_error(StatusCode::BAD_REQUEST, message)
}

pub fn not_found() -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// `{"errors": [message]}` with `status`.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "errors": [message.into()],
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_statuses() {
        let cases = [
            (DispatchError::NotFound, StatusCode::NOT_FOUND),
            (DispatchError::Conflict("no copies".into()), StatusCode::CONFLICT),
            (DispatchError::Concurrency("stale".into()), StatusCode::CONFLICT),
            (DispatchError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                DispatchError::InvariantViolation("below loans".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (DispatchError::Publish("bus".into()), StatusCode::BAD_GATEWAY),
        ];

        for (err, status) in cases {
            assert_eq!(dispatch_error_to_response(err).status(), status);
        }
    }
}
