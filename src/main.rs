use std::net::{IpAddr, SocketAddr};

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triggermap::{
    AppState,
    config::Config,
    middleware::{auth_middleware, log_errors},
    routes,
};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 设置数据库连接池：固定上限，获取连接有超时，耗尽时不无限排队
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout())
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'triggermap_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 启动时应用数据库迁移
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
    };

    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        .route("/ping", get(routes::ping))
        .route("/auth/signup", post(routes::user::signup))
        .route("/auth/login", post(routes::user::login));

    let protected_routes = Router::new()
        .route("/users/me", get(routes::user::me))
        // 触发记录路由
        .route(
            "/triggers",
            get(routes::trigger::list_triggers).post(routes::trigger::create_trigger),
        )
        .route(
            "/triggers/{id}",
            get(routes::trigger::get_trigger)
                .patch(routes::trigger::update_trigger)
                .delete(routes::trigger::delete_trigger),
        )
        .route("/triggers/seed", post(routes::trigger::seed_triggers))
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 创建基础路由
    let router = Router::new().nest(
        &config.api_base_uri.clone(),
        Router::new().merge(public_routes).merge(protected_routes),
    );

    // 添加日志中间件
    let router = router.layer(axum::middleware::from_fn(log_errors));

    // 根据配置构建CORS层
    let cors = if config.cors_allow_any() {
        tracing::debug!("CORS: allowing any origin");
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // 添加应用状态
    let app = router.layer(cors).with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app,
    )
    .await
    .expect("Failed to start server");
}
