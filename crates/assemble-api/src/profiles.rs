use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use assemble_types::api::{
    Claims, ProfileResponse, SendFriendRequest, UpdateProfileRequest, UserSearchQuery, UserSummary,
};

use crate::auth::AppState;
use crate::convert;
use crate::error::with_db;

const SEARCH_LIMIT: u32 = 20;
const MAX_BIO_LEN: usize = 400;

/// GET /profile: the caller's own profile, friends and incoming requests.
pub async fn own_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let uid = claims.sub.to_string();
    let (profile, friends, requests) = with_db(&state, move |db| {
        let profile = db.get_profile(&uid)?;
        let friends = db.list_friends(&uid)?;
        let requests = db.incoming_friend_requests(&uid)?;
        Ok((profile, friends, requests))
    })
    .await?;

    // A valid token for a deleted user
    let profile = profile.ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(ProfileResponse {
        bio: profile.bio.clone(),
        user: convert::user_summary(profile)?,
        friends: convert::user_summaries(friends)?,
        incoming_requests: requests
            .into_iter()
            .map(convert::friend_request)
            .collect::<Result<_, _>>()?,
        is_friend: false,
    }))
}

/// PATCH /profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<StatusCode, StatusCode> {
    if req.bio.chars().count() > MAX_BIO_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    let uid = claims.sub.to_string();
    with_db(&state, move |db| db.update_bio(&uid, req.bio.trim())).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /profiles/{slug}
pub async fn view_profile(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let uid = claims.sub.to_string();
    let found = with_db(&state, move |db| {
        let Some(profile) = db.get_profile_by_slug(&slug)? else {
            return Ok(None);
        };
        let friends = db.list_friends(&profile.user_id)?;
        let is_friend = db.are_friends(&uid, &profile.user_id)?;
        Ok(Some((profile, friends, is_friend)))
    })
    .await?;

    let (profile, friends, is_friend) = found.ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ProfileResponse {
        bio: profile.bio.clone(),
        user: convert::user_summary(profile)?,
        friends: convert::user_summaries(friends)?,
        incoming_requests: Vec::new(),
        is_friend,
    }))
}

/// GET /users/search?username=
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<UserSearchQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UserSummary>>, StatusCode> {
    let fragment = query.username.trim().to_string();
    if fragment.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let uid = claims.sub.to_string();
    let hits = with_db(&state, move |db| db.search_profiles(&fragment, &uid, SEARCH_LIMIT)).await?;
    Ok(Json(convert::user_summaries(hits)?))
}

/// POST /friend-requests: send a request to the profile with slug `to`.
pub async fn send_friend_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendFriendRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let request_id = Uuid::new_v4().to_string();
    let uid = claims.sub.to_string();

    let created = with_db(&state, move |db| {
        let Some(target) = db.get_profile_by_slug(&req.to)? else {
            return Ok(None);
        };
        db.send_friend_request(&request_id, &uid, &target.user_id)?;
        db.get_friend_request(&request_id)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    info!("{} sent a friend request to {}", claims.username, created.to.username);
    Ok((StatusCode::CREATED, Json(convert::friend_request(created)?)))
}

/// POST /friend-requests/{request_id}/accept: only the recipient may accept.
pub async fn accept_friend_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserSummary>, StatusCode> {
    let uid = claims.sub.to_string();
    let rid = request_id.to_string();

    let friend = with_db(&state, move |db| {
        let request = match db.get_friend_request(&rid)? {
            Some(r) if r.to.user_id == uid => r,
            _ => return Ok(None),
        };
        db.accept_friend_request(&uid, &request.from.user_id)?;
        Ok(Some(request.from))
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    info!("{} and {} are now friends", claims.username, friend.username);
    Ok(Json(convert::user_summary(friend)?))
}

/// DELETE /friend-requests/{request_id}: sender withdraws or recipient declines.
pub async fn delete_friend_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, StatusCode> {
    let uid = claims.sub.to_string();
    with_db(&state, move |db| db.delete_friend_request(&request_id.to_string(), &uid)).await?;
    Ok(StatusCode::NO_CONTENT)
}
