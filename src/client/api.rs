use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::utils::{ApiResponse, FieldError, error_codes};

/// 客户端侧的请求失败：HTTP状态、业务错误码与服务端消息
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub code: i32,
    pub message: String,
    pub fields: Vec<FieldError>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (status {}, code {})", self.message, self.status, self.code)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    fn transport(e: reqwest::Error) -> Self {
        ApiError {
            status: e.status().map(|status| status.as_u16()).unwrap_or(0),
            code: error_codes::INTERNAL_ERROR,
            message: format!("请求失败: {}", e),
            fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfileDto {
    pub id: i32,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSessionDto {
    pub token: String,
    pub expires_at: i64,
    pub user: UserProfileDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDto {
    pub id: i32,
    pub trigger_event: String,
    pub factual_description: String,
    pub emotions: Vec<String>,
    pub meaning: String,
    pub past_relationship: String,
    pub trigger_name: String,
    pub intensity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewTriggerDto {
    pub trigger_event: String,
    pub factual_description: String,
    pub emotions: Vec<String>,
    pub meaning: String,
    pub past_relationship: String,
    pub trigger_name: String,
    pub intensity: i32,
}

/// 部分更新的请求体，未设置的字段不会出现在JSON中
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TriggerPatchDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factual_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub past_relationship: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<i32>,
}

/// 会话管理所需的最小API接口，便于在测试中替换
#[allow(async_fn_in_trait)]
pub trait AuthApi {
    async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSessionDto, ApiError>;

    async fn login(&self, email: &str, password: &str) -> Result<AuthSessionDto, ApiError>;

    async fn me(&self, token: &str) -> Result<UserProfileDto, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 解开统一响应信封；非零错误码翻译为ApiError
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status().as_u16();
        let envelope: ApiResponse<Value> = response.json().await.map_err(ApiError::transport)?;

        if envelope.code != error_codes::SUCCESS {
            let fields = envelope
                .resp_data
                .and_then(|data| serde_json::from_value(data).ok())
                .unwrap_or_default();
            return Err(ApiError {
                status,
                code: envelope.code,
                message: envelope.msg,
                fields,
            });
        }

        let data = envelope.resp_data.ok_or_else(|| ApiError {
            status,
            code: error_codes::INTERNAL_ERROR,
            message: "服务器响应缺少数据".to_string(),
            fields: Vec::new(),
        })?;

        serde_json::from_value(data).map_err(|e| ApiError {
            status,
            code: error_codes::INTERNAL_ERROR,
            message: format!("响应解析失败: {}", e),
            fields: Vec::new(),
        })
    }

    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSessionDto, ApiError> {
        let response = self
            .http
            .post(self.url("/auth/signup"))
            .json(&serde_json::json!({
                "username": username,
                "email": email,
                "password": password,
            }))
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::decode(response).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSessionDto, ApiError> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({
                "email": email,
                "password": password,
            }))
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::decode(response).await
    }

    pub async fn me(&self, token: &str) -> Result<UserProfileDto, ApiError> {
        let response = self
            .http
            .get(self.url("/users/me"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::decode(response).await
    }

    pub async fn list_triggers(
        &self,
        token: &str,
        limit: Option<i64>,
    ) -> Result<Vec<TriggerDto>, ApiError> {
        let mut request = self.http.get(self.url("/triggers")).bearer_auth(token);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        let response = request.send().await.map_err(ApiError::transport)?;
        Self::decode(response).await
    }

    pub async fn create_trigger(
        &self,
        token: &str,
        new: &NewTriggerDto,
    ) -> Result<TriggerDto, ApiError> {
        let response = self
            .http
            .post(self.url("/triggers"))
            .bearer_auth(token)
            .json(new)
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::decode(response).await
    }

    pub async fn get_trigger(&self, token: &str, id: i32) -> Result<TriggerDto, ApiError> {
        let response = self
            .http
            .get(self.url(&format!("/triggers/{}", id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::decode(response).await
    }

    pub async fn update_trigger(
        &self,
        token: &str,
        id: i32,
        patch: &TriggerPatchDto,
    ) -> Result<TriggerDto, ApiError> {
        let response = self
            .http
            .patch(self.url(&format!("/triggers/{}", id)))
            .bearer_auth(token)
            .json(patch)
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::decode(response).await
    }

    pub async fn delete_trigger(&self, token: &str, id: i32) -> Result<TriggerDto, ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("/triggers/{}", id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::decode(response).await
    }

    pub async fn seed(&self, token: &str) -> Result<Vec<TriggerDto>, ApiError> {
        let response = self
            .http
            .post(self.url("/triggers/seed"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::transport)?;
        Self::decode(response).await
    }
}

impl AuthApi for ApiClient {
    async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSessionDto, ApiError> {
        ApiClient::signup(self, username, email, password).await
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthSessionDto, ApiError> {
        ApiClient::login(self, email, password).await
    }

    async fn me(&self, token: &str) -> Result<UserProfileDto, ApiError> {
        ApiClient::me(self, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_serializes_only_supplied_fields() {
        let patch = TriggerPatchDto {
            meaning: Some("M2".into()),
            intensity: Some(3),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({"meaning": "M2", "intensity": 3}));
    }

    #[test]
    fn trigger_dto_matches_wire_shape() {
        let wire = json!({
            "id": 5,
            "trigger_event": "E",
            "factual_description": "F",
            "emotions": ["anger", "shame"],
            "meaning": "M",
            "past_relationship": "P",
            "trigger_name": "N",
            "intensity": 7,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        });
        let dto: TriggerDto = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(dto.emotions, vec!["anger".to_string(), "shame".to_string()]);

        // 往返一致，映射层不丢字段
        assert_eq!(serde_json::to_value(&dto).unwrap(), wire);
    }

    #[test]
    fn error_envelope_carries_field_errors() {
        let envelope: ApiResponse<Value> = serde_json::from_value(json!({
            "code": 1000,
            "msg": "参数校验失败",
            "resp_data": [{"field": "intensity", "message": "必须是1到10之间的整数"}]
        }))
        .unwrap();
        assert_eq!(envelope.code, 1000);
        let fields: Vec<FieldError> =
            serde_json::from_value(envelope.resp_data.unwrap()).unwrap();
        assert_eq!(fields[0].field, "intensity");
    }
}
