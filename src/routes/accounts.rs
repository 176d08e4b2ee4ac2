use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::{
    accounts::UserStore,
    error::{ApiError, Result},
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub msg: &'static str,
}

fn users(state: &AppState) -> Result<&UserStore> {
    state
        .users
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Accounts".to_string()))
}

pub async fn register_handler(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<(StatusCode, Json<Message>)> {
    users(&state)?
        .register(&credentials.username, &credentials.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Message {
            msg: "User registered",
        }),
    ))
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<Message>> {
    users(&state)?
        .verify(&credentials.username, &credentials.password)
        .await?;

    Ok(Json(Message {
        msg: "Login successful",
    }))
}
