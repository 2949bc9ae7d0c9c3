use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use uuid::Uuid;

use crate::error::{upstream_error, validation_error, Error};
use crate::external::http_client;

/// An opened payment order, handed to the client so it can collect payment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub payment_id: String,
    pub order_ref: String,
    #[serde(default)]
    pub provider_key: String,
    pub amount: f64,
    pub currency: String,
}

/// What the client reports back after the provider's checkout completes.
/// Untrusted until `verify_payment` has checked the signature server-side.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub order_ref: String,
    pub provider_payment_id: String,
    pub signature: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaymentVerification {
    pub verified: bool,
    pub payment_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn open_order(
        &self,
        booking_id: Uuid,
        payer_id: Uuid,
        payee_id: Uuid,
        amount: f64,
        currency: &str,
    ) -> Result<PaymentOrder, Error>;

    async fn verify_payment(&self, callback: &PaymentCallback)
        -> Result<PaymentVerification, Error>;

    async fn credit_wallet(&self, payment_id: &str) -> Result<(), Error>;
}

#[derive(Debug)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
}

impl HttpPaymentGateway {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            client: http_client()?,
        })
    }

    fn credentials() -> Result<(String, String, String), Error> {
        let api_base = env::var("PAYMENT_API_BASE")?;
        let key = env::var("PAYMENT_API_KEY")?;
        let secret = env::var("PAYMENT_API_SECRET")?;

        Ok((api_base, key, secret))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self))]
    async fn open_order(
        &self,
        booking_id: Uuid,
        payer_id: Uuid,
        payee_id: Uuid,
        amount: f64,
        currency: &str,
    ) -> Result<PaymentOrder, Error> {
        let (api_base, key, secret) = Self::credentials()?;
        let url = format!("https://{}/orders", api_base);

        let res = self
            .client
            .post(url)
            .basic_auth(&key, Some(&secret))
            .json(&json!({
                "receipt": booking_id,
                "payer": payer_id,
                "payee": payee_id,
                "amount": amount,
                "currency": currency,
            }))
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if (400..500).contains(&status_code) {
            return Err(validation_error("payment order rejected"));
        } else if status_code != 200 {
            return Err(upstream_error());
        }

        let mut order: PaymentOrder = res.json().await?;
        order.provider_key = key;

        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    async fn verify_payment(
        &self,
        callback: &PaymentCallback,
    ) -> Result<PaymentVerification, Error> {
        let (api_base, key, secret) = Self::credentials()?;
        let url = format!("https://{}/payments/verify", api_base);

        let res = self
            .client
            .post(url)
            .basic_auth(&key, Some(&secret))
            .json(callback)
            .send()
            .await?;

        let status_code = res.status().as_u16();

        if (400..500).contains(&status_code) {
            return Err(validation_error("payment verification rejected"));
        } else if status_code != 200 {
            return Err(upstream_error());
        }

        Ok(res.json().await?)
    }

    #[tracing::instrument(skip(self))]
    async fn credit_wallet(&self, payment_id: &str) -> Result<(), Error> {
        let (api_base, key, secret) = Self::credentials()?;
        let url = format!("https://{}/wallet/credit", api_base);

        let res = self
            .client
            .post(url)
            .basic_auth(&key, Some(&secret))
            .json(&json!({ "payment_id": payment_id }))
            .send()
            .await?;

        if res.status().as_u16() != 200 {
            return Err(upstream_error());
        }

        Ok(())
    }
}
