use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use uuid::Uuid;

use crate::error::{not_found_error, upstream_error, Error};
use crate::external::http_client;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserPublic {
    pub name: String,
    pub email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub model: String,
    pub vehicle_type: String,
}

/// Read-only lookups against the identity/vehicle collaborator.
#[async_trait]
pub trait IdentityAPI: Send + Sync {
    async fn user_public(&self, id: Uuid) -> Result<UserPublic, Error>;
    async fn vehicles_for_driver(&self, driver_id: Uuid) -> Result<Vec<Vehicle>, Error>;
    /// `None` when the driver has not accumulated a rating yet.
    async fn driver_rating(&self, driver_id: Uuid) -> Result<Option<f64>, Error>;
}

#[derive(Debug)]
pub struct HttpIdentityStore {
    client: reqwest::Client,
}

impl HttpIdentityStore {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            client: http_client()?,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: String) -> Result<T, Error> {
        let api_base = env::var("IDENTITY_API_BASE")?;
        let url = format!("https://{}/{}", api_base, path);

        let res = self.client.get(url).send().await?;

        let status_code = res.status().as_u16();

        if status_code == 404 {
            return Err(not_found_error());
        } else if status_code != 200 {
            return Err(upstream_error());
        }

        Ok(res.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct Rating {
    rating: Option<f64>,
}

#[async_trait]
impl IdentityAPI for HttpIdentityStore {
    #[tracing::instrument(skip(self))]
    async fn user_public(&self, id: Uuid) -> Result<UserPublic, Error> {
        self.get(format!("users/{}", id)).await
    }

    #[tracing::instrument(skip(self))]
    async fn vehicles_for_driver(&self, driver_id: Uuid) -> Result<Vec<Vehicle>, Error> {
        self.get(format!("drivers/{}/vehicles", driver_id)).await
    }

    #[tracing::instrument(skip(self))]
    async fn driver_rating(&self, driver_id: Uuid) -> Result<Option<f64>, Error> {
        let rating: Rating = self.get(format!("drivers/{}/rating", driver_id)).await?;

        Ok(rating.rating)
    }
}
