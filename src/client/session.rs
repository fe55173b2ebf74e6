use std::time::{Duration, Instant};

use crate::client::api::{ApiError, AuthApi, AuthSessionDto, UserProfileDto};
use crate::client::storage::{Storage, TOKEN_KEY, USER_KEY};

/// 认证状态的周期性静默校验间隔
pub const PROFILE_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// 客户端唯一的认证事实来源。
///
/// 持有当前资料、加载标志与最近一次错误；所有会话变更
/// （恢复、登录、注册、登出、后台刷新）都经由这里读写存储。
#[derive(Debug)]
pub struct SessionProvider<S, A> {
    storage: S,
    api: A,
    user: Option<UserProfileDto>,
    loading: bool,
    error: Option<ApiError>,
    last_refresh: Option<Instant>,
    refresh_interval: Duration,
}

impl<S: Storage, A: AuthApi> SessionProvider<S, A> {
    pub fn new(storage: S, api: A) -> Self {
        Self {
            storage,
            api,
            user: None,
            loading: true,
            error: None,
            last_refresh: None,
            refresh_interval: PROFILE_REFRESH_INTERVAL,
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn user(&self) -> Option<&UserProfileDto> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    pub fn token(&self) -> Option<String> {
        self.storage.get(TOKEN_KEY)
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// 启动时根据已存令牌恢复会话。
    /// 无令牌直接进入未认证状态；令牌失效则清除存储的会话。
    pub async fn hydrate(&mut self) {
        let Some(token) = self.storage.get(TOKEN_KEY) else {
            self.user = None;
            self.error = None;
            self.loading = false;
            return;
        };

        self.loading = true;
        match self.api.me(&token).await {
            Ok(profile) => {
                self.remember_profile(profile);
            }
            Err(e) => {
                tracing::debug!("Session hydrate failed: {}", e);
                self.clear_session();
                self.error = Some(e);
            }
        }
        self.loading = false;
    }

    /// 周期性静默刷新资料，发现服务端失效即登出
    pub async fn maybe_refresh(&mut self) {
        if !self.is_authenticated() {
            return;
        }
        let due = self
            .last_refresh
            .map(|at| at.elapsed() >= self.refresh_interval)
            .unwrap_or(true);
        if !due {
            return;
        }

        let Some(token) = self.storage.get(TOKEN_KEY) else {
            self.clear_session();
            return;
        };
        match self.api.me(&token).await {
            Ok(profile) => {
                self.remember_profile(profile);
            }
            Err(e) => {
                tracing::debug!("Background profile refresh failed: {}", e);
                self.clear_session();
                self.error = Some(e);
            }
        }
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<UserProfileDto, ApiError> {
        self.loading = true;
        let result = self.api.login(email, password).await;
        self.loading = false;
        match result {
            Ok(session) => {
                self.persist_session(&session);
                Ok(session.user)
            }
            Err(e) => {
                self.error = Some(e.clone());
                Err(e)
            }
        }
    }

    pub async fn signup(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfileDto, ApiError> {
        self.loading = true;
        let result = self.api.signup(username, email, password).await;
        self.loading = false;
        match result {
            Ok(session) => {
                self.persist_session(&session);
                Ok(session.user)
            }
            Err(e) => {
                self.error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// 登出是同步且无条件的，与网络状态无关
    pub fn logout(&mut self) {
        self.clear_session();
        self.error = None;
    }

    fn remember_profile(&mut self, profile: UserProfileDto) {
        self.storage.set(
            USER_KEY,
            &serde_json::to_string(&profile).unwrap_or_default(),
        );
        self.user = Some(profile);
        self.error = None;
        self.last_refresh = Some(Instant::now());
    }

    fn persist_session(&mut self, session: &AuthSessionDto) {
        self.storage.set(TOKEN_KEY, &session.token);
        self.remember_profile(session.user.clone());
    }

    fn clear_session(&mut self) {
        self.storage.remove(TOKEN_KEY);
        self.storage.remove(USER_KEY);
        self.user = None;
        self.last_refresh = None;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::client::storage::MemoryStorage;
    use crate::utils::error_codes;

    fn profile() -> UserProfileDto {
        UserProfileDto {
            id: 1,
            username: "alice".into(),
            email: "a@x.com".into(),
        }
    }

    fn auth_failed() -> ApiError {
        ApiError {
            status: 401,
            code: error_codes::AUTH_FAILED,
            message: "访问令牌无效或已过期".into(),
            fields: Vec::new(),
        }
    }

    /// 预置应答序列的测试替身
    #[derive(Default)]
    struct FakeAuthApi {
        me_results: Mutex<VecDeque<Result<UserProfileDto, ApiError>>>,
        login_results: Mutex<VecDeque<Result<AuthSessionDto, ApiError>>>,
        signup_results: Mutex<VecDeque<Result<AuthSessionDto, ApiError>>>,
    }

    impl FakeAuthApi {
        fn queue_me(&self, result: Result<UserProfileDto, ApiError>) {
            self.me_results.lock().unwrap().push_back(result);
        }

        fn queue_login(&self, result: Result<AuthSessionDto, ApiError>) {
            self.login_results.lock().unwrap().push_back(result);
        }

        fn queue_signup(&self, result: Result<AuthSessionDto, ApiError>) {
            self.signup_results.lock().unwrap().push_back(result);
        }
    }

    impl AuthApi for &FakeAuthApi {
        async fn signup(
            &self,
            _username: &str,
            _email: &str,
            _password: &str,
        ) -> Result<AuthSessionDto, ApiError> {
            self.signup_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected signup call")
        }

        async fn login(&self, _email: &str, _password: &str) -> Result<AuthSessionDto, ApiError> {
            self.login_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected login call")
        }

        async fn me(&self, _token: &str) -> Result<UserProfileDto, ApiError> {
            self.me_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected me call")
        }
    }

    #[tokio::test]
    async fn hydrate_without_token_is_unauthenticated() {
        let api = FakeAuthApi::default();
        let mut session = SessionProvider::new(MemoryStorage::new(), &api);

        assert!(session.is_loading());
        session.hydrate().await;

        assert!(!session.is_loading());
        assert!(!session.is_authenticated());
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn hydrate_with_valid_token_sets_profile() {
        let api = FakeAuthApi::default();
        api.queue_me(Ok(profile()));

        let mut storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "stored-token");
        let mut session = SessionProvider::new(storage, &api);

        session.hydrate().await;

        assert!(session.is_authenticated());
        assert_eq!(session.user().unwrap().username, "alice");
        assert_eq!(session.token(), Some("stored-token".into()));
        // 资料的本地副本也被写回
        assert!(session.storage_mut().get(USER_KEY).unwrap().contains("alice"));
    }

    #[tokio::test]
    async fn hydrate_failure_clears_stored_session() {
        let api = FakeAuthApi::default();
        api.queue_me(Err(auth_failed()));

        let mut storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "expired-token");
        storage.set(USER_KEY, r#"{"id":1}"#);
        let mut session = SessionProvider::new(storage, &api);

        session.hydrate().await;

        assert!(!session.is_authenticated());
        assert_eq!(session.token(), None);
        assert_eq!(session.storage_mut().get(USER_KEY), None);
        assert_eq!(session.last_error().unwrap().status, 401);
    }

    #[tokio::test]
    async fn login_persists_token_and_profile() {
        let api = FakeAuthApi::default();
        api.queue_login(Ok(AuthSessionDto {
            token: "fresh-token".into(),
            expires_at: 4_102_444_800,
            user: profile(),
        }));

        let mut session = SessionProvider::new(MemoryStorage::new(), &api);
        let user = session.login("a@x.com", "Secret123!").await.unwrap();

        assert_eq!(user.id, 1);
        assert!(session.is_authenticated());
        assert_eq!(session.token(), Some("fresh-token".into()));
    }

    #[tokio::test]
    async fn failed_login_surfaces_error_without_session() {
        let api = FakeAuthApi::default();
        api.queue_login(Err(ApiError {
            status: 401,
            code: error_codes::AUTH_FAILED,
            message: "邮箱或密码错误".into(),
            fields: Vec::new(),
        }));

        let mut session = SessionProvider::new(MemoryStorage::new(), &api);
        let err = session.login("a@x.com", "wrong").await.unwrap_err();

        assert_eq!(err.status, 401);
        assert!(!session.is_authenticated());
        assert_eq!(session.token(), None);
        assert_eq!(session.last_error().unwrap().message, "邮箱或密码错误");
    }

    #[tokio::test]
    async fn signup_persists_session_like_login() {
        let api = FakeAuthApi::default();
        api.queue_signup(Ok(AuthSessionDto {
            token: "signup-token".into(),
            expires_at: 4_102_444_800,
            user: profile(),
        }));

        let mut session = SessionProvider::new(MemoryStorage::new(), &api);
        session.signup("alice", "a@x.com", "Secret123!").await.unwrap();

        assert!(session.is_authenticated());
        assert_eq!(session.token(), Some("signup-token".into()));
    }

    #[tokio::test]
    async fn logout_is_unconditional() {
        let api = FakeAuthApi::default();
        api.queue_me(Ok(profile()));

        let mut storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "stored-token");
        let mut session = SessionProvider::new(storage, &api);
        session.hydrate().await;
        assert!(session.is_authenticated());

        session.logout();

        assert!(!session.is_authenticated());
        assert_eq!(session.token(), None);
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn refresh_failure_forces_logout() {
        let api = FakeAuthApi::default();
        api.queue_me(Ok(profile()));
        api.queue_me(Err(auth_failed()));

        let mut storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "stored-token");
        let mut session = SessionProvider::new(storage, &api)
            .with_refresh_interval(Duration::ZERO);

        session.hydrate().await;
        assert!(session.is_authenticated());

        // 间隔归零使刷新立即到期
        session.maybe_refresh().await;

        assert!(!session.is_authenticated());
        assert_eq!(session.token(), None);
    }

    #[tokio::test]
    async fn refresh_is_skipped_before_interval_elapses() {
        let api = FakeAuthApi::default();
        api.queue_me(Ok(profile()));

        let mut storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "stored-token");
        let mut session = SessionProvider::new(storage, &api);

        session.hydrate().await;
        // 队列为空：此时再调用me()会panic，证明刷新未发生
        session.maybe_refresh().await;

        assert!(session.is_authenticated());
    }
}
