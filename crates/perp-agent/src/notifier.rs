use anyhow::Result;
use reqwest::Client;
use serde_json::json;

/// Discord webhook notifier. An empty webhook URL disables it silently.
pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: String) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            webhook_url,
        })
    }

    pub async fn send_message(&self, content: &str) -> Result<()> {
        if self.webhook_url.is_empty() {
            tracing::debug!("Discord webhook not configured, skipping notification");
            return Ok(());
        }

        let payload = json!({
            "content": content,
            "username": "Perp Agent",
        });

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        tracing::debug!("Discord notification sent");
        Ok(())
    }
}
