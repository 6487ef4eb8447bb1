//! HTTP surface for the JIT migration handler.
//!
//! The handler never returns an error status for a POST: malformed bodies
//! and internal failures all produce a 200 with a `Block` action, because a
//! non-response leaves the directory service unsure of the outcome.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::pipeline::{JitMigrationResult, JitOutcome, JitPipeline, SignInRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInEventBody {
    /// Event type, logged only.
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    pub data: SignInEventData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInEventData {
    pub authentication_context: AuthenticationContext,
    #[serde(default)]
    pub password_context: Option<PasswordContext>,
    /// Compact encrypted credential envelope.
    #[serde(default)]
    pub encrypted_password_context: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationContext {
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub user: EventUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

/// Plaintext credential path, for local testing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordContext {
    pub user_password: String,
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionBody {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResponseData {
    pub actions: Vec<ActionBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignInResponseBody {
    pub data: ResponseData,
}

impl From<JitOutcome> for SignInResponseBody {
    fn from(outcome: JitOutcome) -> Self {
        let action = match outcome.result {
            JitMigrationResult::MigratePassword => ActionBody {
                action_type: "MigratePassword".to_string(),
                title: None,
                message: None,
            },
            JitMigrationResult::Block { title, message } => ActionBody {
                action_type: "Block".to_string(),
                title: Some(title),
                message: Some(message),
            },
            JitMigrationResult::UpdatePassword => ActionBody {
                action_type: "UpdatePassword".to_string(),
                title: None,
                message: None,
            },
            JitMigrationResult::Retry => ActionBody {
                action_type: "Retry".to_string(),
                title: None,
                message: None,
            },
        };
        Self {
            data: ResponseData {
                actions: vec![action],
                nonce: outcome.nonce,
            },
        }
    }
}

impl From<SignInEventBody> for SignInRequest {
    fn from(body: SignInEventBody) -> Self {
        let (plaintext_password, nonce) = match body.data.password_context {
            Some(ctx) => (Some(SecretString::new(ctx.user_password)), ctx.nonce),
            None => (None, None),
        };
        Self {
            user_id: body.data.authentication_context.user.id,
            user_principal_name: body.data.authentication_context.user.user_principal_name,
            correlation_id: body.data.authentication_context.correlation_id,
            plaintext_password,
            nonce,
            encrypted_envelope: body.data.encrypted_password_context,
        }
    }
}

/// Builds the JIT router: `GET /` liveness, `POST /` sign-in events.
pub fn router(pipeline: Arc<JitPipeline>) -> Router {
    Router::new()
        .route("/", get(liveness).post(handle_event))
        .with_state(pipeline)
}

async fn liveness() -> &'static str {
    "OK"
}

async fn handle_event(
    State(pipeline): State<Arc<JitPipeline>>,
    body: Result<Json<SignInEventBody>, JsonRejection>,
) -> Json<SignInResponseBody> {
    let outcome = match body {
        Ok(Json(body)) => {
            pipeline
                .handle(body.into(), &CancellationToken::new())
                .await
        }
        Err(rejection) => {
            warn!(%rejection, "Unparseable sign-in event");
            JitOutcome {
                result: JitMigrationResult::Block {
                    title: crate::pipeline::BLOCK_TITLE.to_string(),
                    message: crate::pipeline::BLOCK_MESSAGE.to_string(),
                },
                nonce: None,
            }
        }
    };
    Json(outcome.into())
}
