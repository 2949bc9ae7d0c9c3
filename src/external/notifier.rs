use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;

use crate::error::{upstream_error, Error};
use crate::external::http_client;

/// Outbound realtime/email delivery. Both channels are best-effort from the
/// engine's point of view: a committed booking or payment state is never
/// rolled back because a notification failed.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn push(&self, topic: &str, payload: Value) -> Result<(), Error>;
    async fn send_email(&self, to: &str, template: &str, data: Value) -> Result<(), Error>;
}

#[derive(Debug)]
pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            client: http_client()?,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    #[tracing::instrument(skip(self, payload))]
    async fn push(&self, topic: &str, payload: Value) -> Result<(), Error> {
        let api_base = env::var("NOTIFIER_API_BASE")?;
        let url = format!("https://{}/push", api_base);

        let res = self
            .client
            .post(url)
            .json(&json!({ "topic": topic, "payload": payload }))
            .send()
            .await?;

        if res.status().as_u16() != 200 {
            return Err(upstream_error());
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, data))]
    async fn send_email(&self, to: &str, template: &str, data: Value) -> Result<(), Error> {
        let api_base = env::var("NOTIFIER_API_BASE")?;
        let url = format!("https://{}/email", api_base);

        let res = self
            .client
            .post(url)
            .json(&json!({ "to": to, "template": template, "data": data }))
            .send()
            .await?;

        if res.status().as_u16() != 200 {
            return Err(upstream_error());
        }

        Ok(())
    }
}
