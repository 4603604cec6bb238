//! Error handler for the back-office.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::backend::BackendError;
use crate::preferences::PreferenceError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("error parsing form data")]
    ParsingForm(Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("{resource} `{id}` does not exist")]
    NotFound { resource: &'static str, id: String },

    #[error("{0}")]
    Confirmation(&'static str),

    #[error("a submission for this record is already in progress")]
    Conflict,

    /// Live listener failure, with the message shown to the user.
    #[error("{0}")]
    Listener(String),

    #[error(transparent)]
    Preferences(#[from] PreferenceError),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid 'Authorization' header")]
    Unauthorized,
}

impl From<crate::pdf::RenderError> for ServerError {
    fn from(err: crate::pdf::RenderError) -> Self {
        ServerError::Internal {
            details: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Backend(err.into())
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Update `instance` field.
    pub fn instance(mut self, instance: &str) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.to_string()),
            })
        })
        .collect();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

fn backend_status(err: &BackendError) -> (StatusCode, &'static str) {
    match err {
        BackendError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, "Record not found.")
        },
        BackendError::EmailInUse => {
            (StatusCode::CONFLICT, "Email address is already in use.")
        },
        BackendError::InvalidCredentials | BackendError::NoSession => {
            (StatusCode::UNAUTHORIZED, "Authentication failed.")
        },
        BackendError::WeakPassword { .. } => {
            (StatusCode::BAD_REQUEST, "Password is too weak.")
        },
        BackendError::Malformed(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "Stored document is malformed.")
        },
        BackendError::Unavailable(_) => {
            (StatusCode::BAD_GATEWAY, "Backend service is unavailable.")
        },
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => response.errors(validation_errors),

            ServerError::ParsingForm(err) => response
                .title("Server error during data parsing.")
                .details(&err.to_string()),

            ServerError::Backend(err) => {
                let (status, title) = backend_status(err);
                tracing::warn!(error = %err, "backend call failed");
                response.title(title).status(status)
            },

            ServerError::NotFound { .. } => response
                .title("Resource not found.")
                .status(StatusCode::NOT_FOUND),

            ServerError::Confirmation(_) => {
                response.title("Confirmation required.")
            },

            ServerError::Conflict => response
                .title("Submission already in progress.")
                .status(StatusCode::CONFLICT),

            ServerError::Listener(_) => response
                .title("Data could not be loaded.")
                .status(StatusCode::BAD_GATEWAY),

            ServerError::Preferences(err) => {
                tracing::error!(error = %err, "preferences not saved");
                response
                    .title("Settings could not be saved.")
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
            },

            ServerError::Unauthorized => response
                .title("Missing or invalid 'Authorization' header.")
                .instance("/login")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");

                ResponseError::default()
            },

            _ => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
