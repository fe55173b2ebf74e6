use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    utils::{
        Claims, error_codes, error_to_api_response, generate_token, hash_password,
        success_to_api_response, validation_to_api_response,
    },
};

use super::model::{AuthResponse, LoginRequest, SignupRequest, User};

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[axum::debug_handler]
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Response {
    if let Err(fields) = req.validate() {
        return (StatusCode::BAD_REQUEST, validation_to_api_response(fields)).into_response();
    }

    let password_hash = match hash_password(&req.password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("Failed to hash password: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(error_codes::INTERNAL_ERROR, "创建账号失败".to_string()),
            )
                .into_response();
        }
    };

    match User::create(&state.pool, req.username.trim(), req.email.trim(), &password_hash).await {
        Ok(user) => match generate_token(user.id, &user.username, &user.email, &state.config) {
            Ok((token, expires_at)) => {
                tracing::info!("Created user account: {}", user.id);
                (
                    StatusCode::CREATED,
                    success_to_api_response(AuthResponse {
                        token,
                        expires_at,
                        user: user.profile(),
                    }),
                )
                    .into_response()
            }
            Err(e) => {
                tracing::error!("Failed to generate token: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_to_api_response::<()>(
                        error_codes::INTERNAL_ERROR,
                        "生成令牌失败".to_string(),
                    ),
                )
                    .into_response()
            }
        },
        Err(e) if is_unique_violation(&e) => (
            StatusCode::CONFLICT,
            error_to_api_response::<()>(error_codes::USER_EXISTS, "该邮箱已被注册".to_string()),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to create user: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(error_codes::INTERNAL_ERROR, "创建账号失败".to_string()),
            )
                .into_response()
        }
    }
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Response {
    // 未注册邮箱与密码错误返回同一提示，避免账号枚举
    let generic_failure = || {
        (
            StatusCode::UNAUTHORIZED,
            error_to_api_response::<()>(error_codes::AUTH_FAILED, "邮箱或密码错误".to_string()),
        )
            .into_response()
    };

    let user = match User::find_by_email(&state.pool, req.email.trim()).await {
        Ok(Some(user)) => user,
        Ok(None) => return generic_failure(),
        Err(e) => {
            tracing::error!("Failed to look up user: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
                .into_response();
        }
    };

    match user.verify_login(&req.password) {
        Ok(true) => (),
        Ok(false) => return generic_failure(),
        Err(e) => {
            tracing::error!("Failed to verify password: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(error_codes::INTERNAL_ERROR, "内部服务器错误".to_string()),
            )
                .into_response();
        }
    }

    match generate_token(user.id, &user.username, &user.email, &state.config) {
        Ok((token, expires_at)) => (
            StatusCode::OK,
            success_to_api_response(AuthResponse {
                token,
                expires_at,
                user: user.profile(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to generate token: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(error_codes::INTERNAL_ERROR, "生成令牌失败".to_string()),
            )
                .into_response()
        }
    }
}

/// 按令牌中的用户ID返回当前用户资料
#[axum::debug_handler]
pub async fn me(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Response {
    match User::find_by_id(&state.pool, claims.sub).await {
        Ok(Some(user)) => (StatusCode::OK, success_to_api_response(user.profile())).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            error_to_api_response::<()>(error_codes::NOT_FOUND, "用户不存在".to_string()),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch current user: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
                .into_response()
        }
    }
}
