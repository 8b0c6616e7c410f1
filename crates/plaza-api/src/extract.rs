//! Extractors whose rejections come back as [`ApiError`], so a malformed
//! body, path or query string still gets the JSON error shape.

use std::marker::PhantomData;

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

/// A JSON body that is read with the request but only decoded when the
/// handler calls [`LateJson::parse`]. Handlers that must answer 404 or 403
/// before looking at the payload take this instead of [`JsonBody`].
pub struct LateJson<T> {
    bytes: Bytes,
    is_json: bool,
    _body: PhantomData<fn() -> T>,
}

impl<T, S> FromRequest<S> for LateJson<T>
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| {
                let mime = ct.split(';').next().unwrap_or_default().trim();
                mime == "application/json" || mime.ends_with("+json")
            });
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(Self {
            bytes,
            is_json,
            _body: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> LateJson<T> {
    pub fn parse(self) -> Result<T, ApiError> {
        if !self.is_json {
            return Err(ApiError::BadRequest(
                "Expected request with `Content-Type: application/json`".into(),
            ));
        }
        let axum::Json(value) = axum::Json::<T>::from_bytes(&self.bytes)?;
        Ok(value)
    }
}
