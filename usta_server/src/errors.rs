use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use thiserror::Error;
use usta_engine::MarketplaceError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("{0}")]
    Marketplace(#[from] MarketplaceError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingAdminToken => StatusCode::UNAUTHORIZED,
                AuthError::InvalidAdminToken => StatusCode::FORBIDDEN,
            },
            Self::Marketplace(e) => marketplace_status(e),
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!("💻️ {self}");
        }
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

fn marketplace_status(e: &MarketplaceError) -> StatusCode {
    use MarketplaceError::*;
    match e {
        Validation(_) => StatusCode::BAD_REQUEST,
        OrderNotFound(_) | CustomerNotFound(_) | ArtisanNotFound(_) | RefundNotFound(_) | PaymentNotFound(_) => {
            StatusCode::NOT_FOUND
        },
        BlockNotFound(_) => StatusCode::NOT_FOUND,
        OrderNoLongerAvailable(_)
        | InvalidTransition { .. }
        | PriceNotSet(_)
        | PaymentFinalized(_)
        | NoReceiptPending(_)
        | ReceiptUnderReview(_)
        | AlreadyReviewed(_)
        | RefundStatusMismatch { .. } => StatusCode::CONFLICT,
        NotAssigned { .. } | NotOwner { .. } | Blocked(_) => StatusCode::FORBIDDEN,
        DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("The X-Admin-Token header is required.")]
    MissingAdminToken,
    #[error("The admin token is not valid.")]
    InvalidAdminToken,
}
