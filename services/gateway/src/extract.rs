//! Extractors that deserialize and validate in one step.
//!
//! Rejections render as 400 with the request id, like every other API error.

use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ApiFailure};
use crate::request_id::RequestId;
use crate::validation::Validate;

pub struct ValidJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiFailure;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = RequestId::from_extensions(req.extensions());

        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::Validation(rejection.body_text()).for_request(&request_id))?;

        value
            .validate()
            .map_err(|message| ApiError::Validation(message).for_request(&request_id))?;

        Ok(Self(value))
    }
}

pub struct ValidQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiFailure;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = RequestId::from_extensions(&parts.extensions);

        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::Validation(rejection.body_text()).for_request(&request_id))?;

        value
            .validate()
            .map_err(|message| ApiError::Validation(message).for_request(&request_id))?;

        Ok(Self(value))
    }
}
