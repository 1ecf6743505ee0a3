/// GET/HEAD /system/health
pub async fn health() -> &'static str {
    "OK"
}
