pub mod trigger;
pub mod user;

// 存活探测
pub async fn ping() -> &'static str {
    "pong"
}
