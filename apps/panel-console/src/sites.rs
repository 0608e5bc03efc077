use panel_stream::{Credential, api_base_url};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::CliError;

/// One entry of `GET /sites`. Fields the console does not use are ignored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub id: i64,
    pub domain: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

pub struct SitesClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl SitesClient {
    pub fn new(api_url: &str) -> Result<Self, CliError> {
        let mut base = api_base_url(api_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("sites")
            .map_err(|err| CliError::Config(err.to_string()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
        })
    }

    pub async fn list(&self, credential: &Credential) -> Result<Vec<Site>, CliError> {
        debug!(target: "panel::console", url = %self.endpoint, "listing sites");
        let response = self
            .http
            .get(self.endpoint.clone())
            .bearer_auth(credential.expose())
            .send()
            .await
            .map_err(|err| CliError::Sites(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CliError::Sites(format!("server returned {status}")));
        }
        response
            .json::<Vec<Site>>()
            .await
            .map_err(|err| CliError::Sites(err.to_string()))
    }

    /// Domain of the first site, the default log target.
    pub async fn first_domain(&self, credential: &Credential) -> Result<String, CliError> {
        self.list(credential)
            .await?
            .into_iter()
            .next()
            .map(|site| site.domain)
            .ok_or(CliError::NoSites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    async fn sites(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
        let authorized = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            == Some("Bearer tok");
        if !authorized {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(Json(json!([
            {"id": 3, "domain": "shop.example", "type": "php", "user_id": 1, "is_active": true},
            {"id": 9, "domain": "api.example", "type": "node", "user_id": 1, "is_active": false}
        ])))
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/api")
    }

    #[test]
    fn endpoint_keeps_path_prefix() {
        let client = SitesClient::new("https://panel.example.com/api").unwrap();
        assert_eq!(
            client.endpoint.as_str(),
            "https://panel.example.com/api/sites"
        );
        let client = SitesClient::new("http://127.0.0.1:8000").unwrap();
        assert_eq!(client.endpoint.as_str(), "http://127.0.0.1:8000/sites");
    }

    #[test]
    fn bare_host_gets_the_same_scheme_as_streams() {
        let client = SitesClient::new("localhost:8000").unwrap();
        assert_eq!(client.endpoint.as_str(), "http://localhost:8000/sites");
        let client = SitesClient::new("panel.example.com/api").unwrap();
        assert_eq!(
            client.endpoint.as_str(),
            "https://panel.example.com/api/sites"
        );
        assert!(matches!(
            SitesClient::new("ftp://panel"),
            Err(CliError::Resolve(_))
        ));
    }

    #[tokio::test]
    async fn lists_sites_with_bearer_token() {
        let base = serve(Router::new().route("/api/sites", get(sites))).await;
        let client = SitesClient::new(&base).unwrap();
        let credential = Credential::new("tok").unwrap();

        let listed = client.list(&credential).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].kind.as_deref(), Some("node"));
        assert!(!listed[1].is_active);
        assert_eq!(
            client.first_domain(&credential).await.unwrap(),
            "shop.example"
        );
    }

    #[tokio::test]
    async fn rejected_token_is_an_error() {
        let base = serve(Router::new().route("/api/sites", get(sites))).await;
        let client = SitesClient::new(&base).unwrap();
        let err = client
            .list(&Credential::new("wrong").unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn empty_listing_has_no_default() {
        let base = serve(Router::new().route("/api/sites", get(|| async { Json(json!([])) }))).await;
        let client = SitesClient::new(&base).unwrap();
        let err = client
            .first_domain(&Credential::new("tok").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::NoSites));
    }
}
