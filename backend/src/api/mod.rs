pub mod health;
pub mod orders;
pub mod wallets;

use actix_web::{http::header, HttpResponse};
use shared::{ApiResponse, PoolError};

const RATE_LIMIT_RETRY_SECONDS: u64 = 60;

/// Maps a pool error to its HTTP status inside the standard envelope.
pub fn error_response(error: &PoolError, retry_after_seconds: u64) -> HttpResponse {
    let body = ApiResponse::<()>::error(error.to_string());
    match error {
        PoolError::NoWalletAvailable => HttpResponse::ServiceUnavailable()
            .insert_header((header::RETRY_AFTER, retry_after_seconds.to_string()))
            .json(body),
        PoolError::RateLimited(_) => HttpResponse::TooManyRequests()
            .insert_header((header::RETRY_AFTER, RATE_LIMIT_RETRY_SECONDS.to_string()))
            .json(body),
        PoolError::WalletNotFound(_)
        | PoolError::OrderNotFound(_)
        | PoolError::UnknownReservation(_) => HttpResponse::NotFound().json(body),
        PoolError::WalletCurrentlyReserved(_)
        | PoolError::AlreadyResolved(_)
        | PoolError::InvalidTransition { .. }
        | PoolError::DuplicateAddress(_)
        | PoolError::DuplicatePaymentHash(_)
        | PoolError::InvariantViolation { .. } => HttpResponse::Conflict().json(body),
        PoolError::InvalidAddress(_)
        | PoolError::InvalidTxHash(_)
        | PoolError::InvalidAmount(_)
        | PoolError::InvalidRequest(_)
        | PoolError::OperatorConfirmationRequired(_) => HttpResponse::BadRequest().json(body),
        PoolError::PersistenceFailure(_) | PoolError::CorruptRecord(_) => {
            tracing::error!("Internal error: {}", error);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use uuid::Uuid;

    #[test]
    fn exhausted_pool_carries_retry_hint() {
        let response = error_response(&PoolError::NoWalletAvailable, 12);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "12"
        );
    }

    #[test]
    fn status_codes_by_category() {
        let cases = [
            (PoolError::RateLimited("u".into()), StatusCode::TOO_MANY_REQUESTS),
            (PoolError::OrderNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (PoolError::WalletCurrentlyReserved(1), StatusCode::CONFLICT),
            (PoolError::DuplicatePaymentHash(Uuid::nil()), StatusCode::CONFLICT),
            (PoolError::InvalidTxHash("x".into()), StatusCode::BAD_REQUEST),
            (PoolError::OperatorConfirmationRequired(1), StatusCode::BAD_REQUEST),
            (PoolError::PersistenceFailure("db".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error_response(&error, 10).status(), status, "{}", error);
        }
    }
}
