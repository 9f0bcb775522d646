use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::require_user;
use crate::directory::WishlistItem;
use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub(crate) struct WishlistRequest {
    items: Vec<WishlistItem>,
}

#[derive(Serialize)]
pub(crate) struct WishlistResponse {
    items: Vec<WishlistItem>,
}

/// Trims every field, drops blank optionals and checks titles and links.
pub fn clean_items(items: Vec<WishlistItem>) -> Result<Vec<WishlistItem>, ApiError> {
    items
        .into_iter()
        .map(|item| {
            let title = item.title.trim().to_string();
            if title.is_empty() {
                return Err(ApiError::Validation("item title is required".into()));
            }
            let description = non_blank(item.description);
            let link = non_blank(item.link);
            if let Some(link) = &link {
                let url = Url::parse(link)
                    .map_err(|_| ApiError::Validation("link must be a valid URL".into()))?;
                // rendered as a clickable href for the friend
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ApiError::Validation(
                        "link must be an http or https URL".into(),
                    ));
                }
            }
            Ok(WishlistItem {
                title,
                description,
                link,
            })
        })
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) async fn get_mine(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WishlistResponse>, ApiError> {
    let user = require_user(&state, &headers).await?;
    let items = state.directory().wishlist(&user.id)?;
    Ok(Json(WishlistResponse { items }))
}

pub(crate) async fn put_mine(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<WishlistRequest>, JsonRejection>,
) -> Result<Json<WishlistResponse>, ApiError> {
    let Json(payload) = payload?;
    let user = require_user(&state, &headers).await?;
    let items = clean_items(payload.items)?;
    let items = state.directory().replace_wishlist(&user.id, items)?;
    state.directory().persist().await;
    Ok(Json(WishlistResponse { items }))
}

pub(crate) async fn get_friend(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WishlistResponse>, ApiError> {
    let user = require_user(&state, &headers).await?;
    let items = state.directory().friend_wishlist(&user.id)?;
    Ok(Json(WishlistResponse { items }))
}
