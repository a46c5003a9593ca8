use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::ACCEPT;
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use tower::Service;
use url::Url;

use super::auth;
use super::multipart;
use super::NoToken;
use super::StaticToken;
use super::TokenProvider;
use crate::configuration::Configuration;
use crate::configuration::ConfigurationError;
use crate::error::FetchError;
use crate::graphql;
use crate::json_ext::Object;
use crate::uploads;
use crate::uploads::Extracted;
use crate::uploads::Variables;

const APPLICATION_JSON: &str = "application/json";

/// HTTP transport to the GraphQL endpoint.
///
/// Operations without files are posted as JSON; operations whose variables
/// hold files are posted as `multipart/form-data`. Both carry a bearer
/// `Authorization` header. There are no retries, and the transport never
/// touches the store.
#[derive(Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: Url,
    token_provider: Arc<dyn TokenProvider>,
    accept_language: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation_name: Option<&'a str>,
    variables: &'a Object,
}

#[buildstructor::buildstructor]
impl HttpTransport {
    /// Creates a transport posting to `endpoint`.
    ///
    /// Requests are anonymous unless a token provider is set.
    #[builder(visibility = "pub")]
    fn new(
        endpoint: Url,
        token_provider: Option<Arc<dyn TokenProvider>>,
        accept_language: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ConfigurationError> {
        let mut http_client = reqwest::Client::builder().tcp_keepalive(Some(Duration::from_secs(5)));
        if let Some(timeout) = timeout {
            http_client = http_client.timeout(timeout);
        }
        Ok(Self {
            http_client: http_client.build()?,
            endpoint,
            token_provider: token_provider.unwrap_or_else(|| Arc::new(NoToken)),
            accept_language,
        })
    }

    /// Creates a transport from the endpoint, token and language settings.
    pub fn from_configuration(configuration: &Configuration) -> Result<Self, ConfigurationError> {
        let token_provider: Arc<dyn TokenProvider> = match &configuration.auth.token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(NoToken),
        };
        Self::builder()
            .endpoint(configuration.endpoint()?)
            .token_provider(token_provider)
            .and_accept_language(configuration.accept_language.clone())
            .and_timeout(configuration.timeout)
            .build()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends an operation given as query text and variables.
    pub async fn send(&self, query: &str, variables: &Variables) -> Result<graphql::Response, FetchError> {
        let request = graphql::Request::new(query).with_variables(variables.clone());
        self.execute(&request).await
    }

    /// Sends an operation, choosing the encoding from its variables.
    pub async fn execute(&self, request: &graphql::Request) -> Result<graphql::Response, FetchError> {
        let Extracted {
            variables,
            uploadables,
        } = uploads::extract(&request.variables);

        let mut builder = self
            .http_client
            .post(self.endpoint.clone())
            .header(ACCEPT, APPLICATION_JSON)
            .header(AUTHORIZATION, auth::authorization(self.token_provider.as_ref())?);
        if let Some(accept_language) = &self.accept_language {
            builder = builder.header(ACCEPT_LANGUAGE, accept_language.as_str());
        }
        builder = match uploadables {
            Some(uploadables) => {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    files = uploadables.len(),
                    "sending multipart operation"
                );
                builder.multipart(multipart::form(&request.query, &variables, &uploadables)?)
            }
            None => {
                tracing::debug!(endpoint = %self.endpoint, "sending operation");
                builder.json(&JsonBody {
                    query: &request.query,
                    operation_name: request.operation_name.as_deref(),
                    variables: &variables,
                })
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        tracing::trace!(status, body = %String::from_utf8_lossy(&body), "received response");

        graphql::Response::from_bytes(status, body).map_err(|error| {
            tracing::warn!(%error, "could not decode GraphQL response");
            error
        })
    }
}

impl Service<graphql::Request> for HttpTransport {
    type Response = graphql::Response;
    type Error = FetchError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: graphql::Request) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move { transport.execute(&request).await })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_log::test;
    use tower::ServiceExt;
    use wiremock::matchers::body_json;
    use wiremock::matchers::header;
    use wiremock::matchers::method;
    use wiremock::matchers::path;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;

    use super::*;
    use crate::uploads::Upload;
    use crate::uploads::VariableValue;

    fn transport(server: &MockServer, token: Option<&str>) -> HttpTransport {
        let endpoint = Url::parse(&server.uri()).unwrap().join("/api").unwrap();
        HttpTransport::builder()
            .endpoint(endpoint)
            .and_token_provider(
                token.map(|token| Arc::new(StaticToken::new(token)) as Arc<dyn TokenProvider>),
            )
            .accept_language("it-IT")
            .build()
            .unwrap()
    }

    async fn multipart_fields(request: &wiremock::Request) -> Vec<(String, Option<String>, Bytes)> {
        let content_type = request
            .headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
        let boundary = multer::parse_boundary(content_type).unwrap();
        let body = Bytes::from(request.body.clone());
        let mut multipart = multer::Multipart::new(
            futures::stream::once(async move { Ok::<_, Infallible>(body) }),
            boundary,
        );
        let mut fields = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap().to_string();
            let file_name = field.file_name().map(str::to_string);
            fields.push((name, file_name, field.bytes().await.unwrap()));
        }
        fields
    }

    #[test(tokio::test)]
    async fn sends_json_without_files() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api"))
            .and(header("content-type", "application/json"))
            .and(header("authorization", "Bearer eyJhbGciOi"))
            .and(header("accept-language", "it-IT"))
            .and(body_json(json!({
                "query": "query { devices { id } }",
                "variables": {"first": 10}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"devices": [{"id": "RGV2aWNlOjE="}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let variables = uploads::variables_from_object(
            serde_json_bytes::json!({"first": 10}).as_object().unwrap(),
        );
        let response = transport(&server, Some("eyJhbGciOi"))
            .send("query { devices { id } }", &variables)
            .await
            .unwrap();

        assert_eq!(
            response.data,
            Some(serde_json_bytes::json!({"devices": [{"id": "RGV2aWNlOjE="}]}))
        );
    }

    #[test(tokio::test)]
    async fn sends_multipart_with_files() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api"))
            .and(header("authorization", "Bearer eyJhbGciOi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"createBaseImage": {"result": {"id": "QmFzZUltYWdlOjE="}}}
            })))
            .mount(&server)
            .await;

        let input: Variables = [
            ("version".to_string(), VariableValue::Json("1.0.0".into())),
            (
                "file".to_string(),
                Upload::new(Bytes::from_static(b"image bytes"))
                    .with_file_name("image.bin")
                    .into(),
            ),
        ]
        .into_iter()
        .collect();
        let variables: Variables = [("input".to_string(), input.into())].into_iter().collect();

        let response = transport(&server, Some("eyJhbGciOi"))
            .send("mutation CreateBaseImage($input: CreateBaseImageInput!) { createBaseImage(input: $input) { result { id } } }", &variables)
            .await
            .unwrap();
        assert!(!response.has_errors());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let fields = multipart_fields(&requests[0]).await;
        let names: Vec<_> = fields.iter().map(|(name, _, _)| name.as_str()).collect();
        assert_eq!(names, vec!["file", "query", "variables"]);

        let (_, file_name, content) = &fields[0];
        assert_eq!(file_name.as_deref(), Some("image.bin"));
        assert_eq!(content, &Bytes::from_static(b"image bytes"));

        let variables: serde_json::Value = serde_json::from_slice(&fields[2].2).unwrap();
        assert_eq!(
            variables,
            json!({"input": {"version": "1.0.0", "file": "file"}})
        );
    }

    #[test(tokio::test)]
    async fn anonymous_requests_carry_empty_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
            .mount(&server)
            .await;

        transport(&server, None)
            .send("query { tenantInfo { name } }", &Variables::new())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let authorization = requests[0].headers.get("authorization").unwrap();
        assert!(authorization.to_str().unwrap().starts_with("Bearer"));
        assert!(authorization.to_str().unwrap().trim_end().ends_with("Bearer"));
    }

    #[test(tokio::test)]
    async fn graphql_errors_are_not_fetch_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": [{"message": "Cannot query field \"foo\" on type \"RootQueryType\"."}]
            })))
            .mount(&server)
            .await;

        let response = transport(&server, None)
            .ready()
            .await
            .unwrap()
            .call(graphql::Request::new("query { foo }"))
            .await
            .unwrap();

        assert_eq!(
            response.error_feedback().as_deref(),
            Some("Cannot query field \"foo\" on type \"RootQueryType\".")
        );
    }

    #[test(tokio::test)]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let error = transport(&server, None)
            .send("query { tenantInfo { name } }", &Variables::new())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            FetchError::MalformedResponse { status: 502, .. }
        ));
    }

    #[test(tokio::test)]
    async fn unreachable_server() {
        let transport = HttpTransport::builder()
            .endpoint(Url::parse("http://127.0.0.1:9/api").unwrap())
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let error = transport
            .send("query { tenantInfo { name } }", &Variables::new())
            .await
            .unwrap_err();

        assert!(matches!(error, FetchError::Unreachable { .. }));
        assert_eq!(error.user_message(), crate::error::UNREACHABLE_MESSAGE);
    }
}
