use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    AppState,
    utils::{
        Claims, error_codes, error_to_api_response, success_to_api_response,
        validation_to_api_response,
    },
};

use super::model::{NewTrigger, TriggerInfo, TriggerPatch, TriggerRow};

const DEFAULT_LIST_LIMIT: i64 = 10;
const MAX_LIST_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

fn not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        error_to_api_response::<()>(error_codes::NOT_FOUND, "触发记录不存在".to_string()),
    )
        .into_response()
}

fn internal_response(msg: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error_to_api_response::<()>(error_codes::INTERNAL_ERROR, msg.to_string()),
    )
        .into_response()
}

/// 按当前用户倒序列出触发记录，默认10条，无记录时返回空列表
#[axum::debug_handler]
pub async fn list_triggers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = query
        .limit
        .map(|limit| limit.clamp(1, MAX_LIST_LIMIT))
        .unwrap_or(DEFAULT_LIST_LIMIT);

    match TriggerRow::list(&state.pool, claims.sub, limit).await {
        Ok(rows) => {
            let triggers: Vec<TriggerInfo> = rows.into_iter().map(TriggerInfo::from).collect();
            (StatusCode::OK, success_to_api_response(triggers)).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to list triggers: {}", e);
            internal_response("获取触发记录失败")
        }
    }
}

#[axum::debug_handler]
pub async fn create_trigger(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<Value>,
) -> Response {
    let new = match NewTrigger::from_value(&body) {
        Ok(new) => new,
        Err(fields) => {
            return (StatusCode::BAD_REQUEST, validation_to_api_response(fields)).into_response();
        }
    };

    match TriggerRow::create(&state.pool, claims.sub, &new).await {
        Ok(row) => {
            tracing::info!("Created trigger {} for user {}", row.id, claims.sub);
            (
                StatusCode::CREATED,
                success_to_api_response(TriggerInfo::from(row)),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Failed to create trigger: {}", e);
            internal_response("创建触发记录失败")
        }
    }
}

#[axum::debug_handler]
pub async fn get_trigger(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> Response {
    match TriggerRow::find_by_id(&state.pool, claims.sub, id).await {
        Ok(Some(row)) => {
            (StatusCode::OK, success_to_api_response(TriggerInfo::from(row))).into_response()
        }
        // 不属于调用者的记录与不存在的记录不可区分
        Ok(None) => not_found_response(),
        Err(e) => {
            tracing::error!("Failed to fetch trigger {}: {}", id, e);
            internal_response("获取触发记录失败")
        }
    }
}

#[axum::debug_handler]
pub async fn update_trigger(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
    Json(body): Json<Value>,
) -> Response {
    let patch = match TriggerPatch::from_value(&body) {
        Ok(patch) => patch,
        Err(fields) => {
            return (StatusCode::BAD_REQUEST, validation_to_api_response(fields)).into_response();
        }
    };

    match TriggerRow::update(&state.pool, claims.sub, id, &patch).await {
        Ok(Some(row)) => {
            (StatusCode::OK, success_to_api_response(TriggerInfo::from(row))).into_response()
        }
        Ok(None) => not_found_response(),
        Err(e) => {
            tracing::error!("Failed to update trigger {}: {}", id, e);
            internal_response("更新触发记录失败")
        }
    }
}

#[axum::debug_handler]
pub async fn delete_trigger(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> Response {
    match TriggerRow::delete(&state.pool, claims.sub, id).await {
        Ok(Some(row)) => {
            tracing::info!("Deleted trigger {} for user {}", id, claims.sub);
            (StatusCode::OK, success_to_api_response(TriggerInfo::from(row))).into_response()
        }
        Ok(None) => not_found_response(),
        Err(e) => {
            tracing::error!("Failed to delete trigger {}: {}", id, e);
            internal_response("删除触发记录失败")
        }
    }
}

/// 为当前用户写入一批示例记录，整批在单个事务中完成
#[axum::debug_handler]
pub async fn seed_triggers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Response {
    match TriggerRow::seed(&state.pool, claims.sub).await {
        Ok(rows) => {
            tracing::info!("Seeded {} triggers for user {}", rows.len(), claims.sub);
            let triggers: Vec<TriggerInfo> = rows.into_iter().map(TriggerInfo::from).collect();
            (StatusCode::CREATED, success_to_api_response(triggers)).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to seed triggers: {}", e);
            internal_response("写入示例数据失败")
        }
    }
}
