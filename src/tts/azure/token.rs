//! Subscription key → bearer token exchange.

use crate::error::{AvatarError, Result};
use tracing::debug;

/// Regional token endpoint.
pub fn default_token_url(region: &str) -> String {
    format!("https://{region}.api.cognitive.microsoft.com/sts/v1.0/issueToken")
}

/// Exchange a subscription key for a short-lived bearer token.
///
/// # Errors
///
/// Returns [`AvatarError::Synthesis`] on transport errors, non-success
/// status codes or an empty token.
pub async fn issue_token(client: &reqwest::Client, url: &str, key: &str) -> Result<String> {
    let response = client
        .post(url)
        .header("Ocp-Apim-Subscription-Key", key)
        .body("")
        .send()
        .await
        .map_err(|e| AvatarError::Synthesis(format!("token request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AvatarError::Synthesis(format!(
            "token request failed ({status}): {body}"
        )));
    }

    let token = response
        .text()
        .await
        .map_err(|e| AvatarError::Synthesis(format!("token response unreadable: {e}")))?;
    let token = token.trim();
    if token.is_empty() {
        return Err(AvatarError::Synthesis("token endpoint returned an empty token".into()));
    }
    debug!(len = token.len(), "speech token issued");
    Ok(token.to_owned())
}
