use std::{fmt::Display, time::Duration};

use futures::{future::BoxFuture, FutureExt};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::post::{PostDraft, RemoteId, RemotePost};

/// Remote post collection. Object safe so the feed can hold any backend.
pub trait PostService: Send + Sync {
    /// `GET /posts`
    fn list(&self) -> BoxFuture<'_, Result<Vec<RemotePost>, ApiError>>;
    /// `POST /posts`. Yields the server id when the response carries one.
    fn create<'a>(&'a self, draft: &'a PostDraft) -> BoxFuture<'a, Result<Option<String>, ApiError>>;
    /// `PUT /posts/{id}`
    fn update<'a>(&'a self, id: &'a str, draft: &'a PostDraft) -> BoxFuture<'a, Result<(), ApiError>>;
    /// `DELETE /posts/{id}`
    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), ApiError>>;
}

#[derive(Debug)]
pub enum ApiError {
    Http(reqwest::Error),
    Scheme(serde_json::Error),
    Server { status: u16, body: String },
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(e) => e.fmt(f),
            Self::Scheme(e) => e.fmt(f),
            Self::Server { status, body } if body.is_empty() => {
                write!(f, "API returned status {status}")
            }
            Self::Server { status, body } => write!(f, "API returned status {status}: {body}"),
        }
    }
}
impl std::error::Error for ApiError {}

/// [`PostService`] over a REST backend rooted at `base_url`.
pub struct HttpPostService {
    base_url: String,
    client: Client,
}

#[derive(Deserialize)]
struct Created {
    #[serde(default)]
    id: Option<RemoteId>,
}

impl HttpPostService {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client: builder.build().map_err(ApiError::Http)?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/posts{path}", self.base_url)
    }
}

/// Sends `req` and returns the body of a successful response.
async fn send(req: RequestBuilder) -> Result<String, ApiError> {
    let res = req.send().await.map_err(ApiError::Http)?;
    let status = res.status();
    let body = res.text().await.map_err(ApiError::Http)?;

    if !status.is_success() {
        return Err(ApiError::Server {
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}

impl PostService for HttpPostService {
    fn list(&self) -> BoxFuture<'_, Result<Vec<RemotePost>, ApiError>> {
        let req = self.client.get(self.url(""));

        async move {
            let body = send(req).await?;
            serde_json::from_str(&body).map_err(ApiError::Scheme)
        }
        .boxed()
    }

    fn create<'a>(&'a self, draft: &'a PostDraft) -> BoxFuture<'a, Result<Option<String>, ApiError>> {
        let req = self.client.post(self.url("")).json(draft);

        async move {
            let body = send(req).await?;
            // the post is stored at this point, a body we cannot read only
            // costs us the server id
            match serde_json::from_str::<Created>(&body) {
                Ok(created) => Ok(created.id.map(|id| id.to_string())),
                Err(e) => {
                    tracing::warn!("creation response is not a post: {e}");
                    Ok(None)
                }
            }
        }
        .boxed()
    }

    fn update<'a>(&'a self, id: &'a str, draft: &'a PostDraft) -> BoxFuture<'a, Result<(), ApiError>> {
        let req = self.client.put(self.url(&format!("/{id}"))).json(draft);

        async move { send(req).await.map(drop) }.boxed()
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), ApiError>> {
        let req = self.client.delete(self.url(&format!("/{id}")));

        async move { send(req).await.map(drop) }.boxed()
    }
}
