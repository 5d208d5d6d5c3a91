use oauth2_api_client::{new_api_client_async, OAuth2Config, RequestBody};
use reqwest::Method;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = OAuth2Config::new(
        getenv("OAUTH_TOKEN_URL")?,
        getenv("OAUTH_CLIENT_ID")?,
        getenv("OAUTH_CLIENT_SECRET")?,
        ["read", "write"],
    )?;
    let base_url = getenv("API_BASE_URL")?;

    let client = new_api_client_async(config, base_url)?;

    let (body, status) = client
        .call_api(Method::GET, "/api/user", None, None)
        .await?
        .into_parts();
    info!(message = "GET /api/user", status, body = ?body);

    let user = json!({"name": "John Doe", "email": "john@example.com"});
    let (body, status) = client
        .call_api(Method::POST, "/api/user", None, Some(RequestBody::from(user)))
        .await?
        .into_parts();
    info!(message = "POST /api/user", status, body = ?body);

    let download = client
        .download_file(Method::GET, "/api/document", "downloaded_document.pdf", None, None)
        .await?;
    info!(
        message = "Downloaded document",
        path = %download.path.display(),
        bytes_written = download.bytes_written,
    );

    client.close();
    Ok(())
}

fn getenv(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("env var {} is not set", key))
}
