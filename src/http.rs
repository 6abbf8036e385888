use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{
    header, Method, RequestBuilder, Url
};
use serde::{
    de::DeserializeOwned,
    Deserialize,
};
use serde_json::{
    json, Value
};

use crate::{
    config::Credentials,
    error::{Error, Result},
    gateway::{
        Acquisition, Analysis, AnalysisRequest, Gateway, Gear, Project, Session
    },
};

// gears come wrapped: [{"gear": {...}}]
#[derive(Debug, Deserialize)]
struct GearDoc {
    gear: Gear,
}

#[derive(Debug, Deserialize)]
struct SessionDoc {
    #[serde(default)]
    analyses: Option<Vec<Analysis>>,
}

#[derive(Debug, Deserialize)]
struct Created {
    #[serde(rename = "_id")]
    id: String,
}

// a hung request fails its session instead of blocking shutdown
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// [`Gateway`] over the service's REST API.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl HttpGateway {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let mut root = credentials.url.trim_end_matches('/').to_string();
        root.push_str("/api/");
        let base_url = Url::parse(&root)
            .map_err(|e| Error::InvalidUrl(format!("`{}`: {e}", credentials.url)))?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client: client,
            base_url: base_url,
            api_key: credentials.api_key.clone(),
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.base_url
            .join(endpoint)
            .map_err(|e| Error::InvalidUrl(format!("`{endpoint}`: {e}")))?;
        debug!("{method} {url}");
        Ok(self.client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("scitran-user {}", self.api_key)))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>
    ) -> Result<T> {
        let mut builder = self.request(method.clone(), endpoint)?;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        if false == status.is_success() {
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                method: method.to_string(),
                url: url,
                body: body,
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.send(Method::GET, endpoint, None).await
    }
}

// request body of an ad-hoc gear run
pub fn submission_body(request: &AnalysisRequest) -> Value {
    json!({
        "job": {
            "gear": request.gear_name,
            "tags": ["ad-hoc"],
            "inputs": request.inputs,
            "config": request.config,
        },
        "analysis": {
            "label": request.label,
        },
    })
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn list_gears(&self) -> Result<Vec<Gear>> {
        let docs: Vec<GearDoc> = self.get("gears?fields=all").await?;
        Ok(docs.into_iter().map(|d| d.gear).collect())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.get("projects").await
    }

    async fn list_sessions(&self, project_id: &str) -> Result<Vec<Session>> {
        self.get(&format!("projects/{project_id}/sessions")).await
    }

    async fn list_acquisitions(&self, session_id: &str) -> Result<Vec<Acquisition>> {
        self.get(&format!("sessions/{session_id}/acquisitions")).await
    }

    // session.analyses honours deletions made in the UI, unlike session jobs
    async fn session_analyses(&self, session_id: &str) -> Result<Vec<Analysis>> {
        let doc: SessionDoc = self.get(&format!("sessions/{session_id}")).await?;
        Ok(doc.analyses.unwrap_or_default())
    }

    async fn submit_analysis(
        &self,
        session_id: &str,
        request: &AnalysisRequest
    ) -> Result<String> {
        let body = submission_body(request);
        let created: Created = self
            .send(Method::POST, &format!("sessions/{session_id}/analyses?job=true"), Some(&body))
            .await?;
        Ok(created.id)
    }
}
