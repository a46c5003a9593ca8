//! Main entry point for the CLI command sending one operation.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::configuration::generate_config_schema;
use crate::configuration::Configuration;
use crate::environment::Environment;
use crate::graphql;
use crate::json_ext::Value;
use crate::store::Store;
use crate::store::StorePatch;
use crate::uploads;
use crate::uploads::Upload;
use crate::uploads::VariableValue;
use crate::uploads::Variables;

/// Options for the client
#[derive(Parser, Debug)]
#[clap(
    name = "edgehog-relay",
    about = "Send a GraphQL operation to an Edgehog backend"
)]
struct Opt {
    /// Log level (off|error|warn|info|debug|trace).
    #[clap(long = "log", default_value = "info", env = "EDGEHOG_RELAY_LOG")]
    log_level: String,

    /// Configuration file in YAML syntax.
    #[clap(short, long = "config", env = "EDGEHOG_RELAY_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// The GraphQL endpoint, overriding the configured origin and backend url.
    #[clap(long, env = "EDGEHOG_RELAY_ENDPOINT")]
    endpoint: Option<Url>,

    /// The bearer token, overriding the configured one.
    #[clap(long, env = "EDGEHOG_RELAY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// File holding the GraphQL operation.
    #[clap(short, long = "query")]
    query_path: Option<PathBuf>,

    /// The variables, as a JSON object.
    #[clap(long)]
    variables: Option<String>,

    /// A file to upload, as `path.in.variables=file`, optionally followed by
    /// `;type=<content type>`. May be repeated.
    #[clap(long = "upload", value_name = "PATH=FILE[;type=TYPE]")]
    uploads: Vec<String>,

    /// Prints the configuration schema.
    #[clap(long)]
    schema: bool,
}

/// This is the main entrypoint.
pub fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(start())
}

async fn start() -> Result<()> {
    let opt = Opt::parse();

    if opt.schema {
        let schema = generate_config_schema();
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let builder = tracing_subscriber::fmt::fmt()
        .with_env_filter(
            EnvFilter::try_new(&opt.log_level).context("could not parse log configuration")?,
        )
        .with_writer(std::io::stderr);
    if std::io::stderr().is_terminal() {
        builder.try_init()
    } else {
        builder.json().try_init()
    }
    .map_err(|error| anyhow!("could not set the log subscriber: {error}"))?;

    let mut configuration = match &opt.config_path {
        Some(path) => Configuration::from_file(path)?,
        None => Configuration::default(),
    };
    if let Some(endpoint) = &opt.endpoint {
        configuration.backend_url = endpoint.to_string();
    }
    if let Some(token) = &opt.token {
        configuration.auth.token = Some(token.clone());
    }

    let query_path = opt
        .query_path
        .as_ref()
        .ok_or_else(|| anyhow!("an operation is required, pass it with '--query <file>'"))?;
    let query = tokio::fs::read_to_string(query_path)
        .await
        .with_context(|| format!("could not read operation from '{}'", query_path.display()))?;

    let mut variables = match &opt.variables {
        Some(variables) => parse_variables(variables)?,
        None => Variables::new(),
    };
    for upload in &opt.uploads {
        let (path, upload) = read_upload(upload).await?;
        insert_upload(&mut variables, path, upload)?;
    }

    let environment = Environment::from_configuration(&configuration)?;
    let request = graphql::Request::new(query.as_str()).with_variables(variables);
    tracing::info!(endpoint = %configuration.endpoint()?, "sending operation");
    let response = if is_mutation(&query) {
        environment
            .commit_mutation(request, |_: &graphql::Response, _: &Store| {
                Vec::<StorePatch>::new()
            })
            .await
    } else {
        environment.fetch_query(request).await
    }
    .map_err(|error| {
        tracing::error!(%error, "{}", error.user_message());
        error
    })?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn is_mutation(query: &str) -> bool {
    query.trim_start().starts_with("mutation")
}

fn parse_variables(variables: &str) -> Result<Variables> {
    let value: Value = serde_json::from_str(variables).context("could not parse variables")?;
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("variables must be a JSON object"))?;
    Ok(uploads::variables_from_object(object))
}

/// Reads the file of an `--upload` option, returning its variables path.
async fn read_upload(option: &str) -> Result<(&str, Upload)> {
    let (path, file) = option
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid upload '{option}', expected PATH=FILE"))?;
    let (file, content_type) = match file.split_once(";type=") {
        Some((file, content_type)) if !content_type.is_empty() => (file, Some(content_type)),
        Some(_) => return Err(anyhow!("invalid upload '{option}', missing content type")),
        None => (file, None),
    };
    let mut upload = Upload::from_path(file).await?;
    if let Some(content_type) = content_type {
        upload = upload.with_content_type(content_type);
    }
    Ok((path, upload))
}

/// Places `upload` at a dotted path in `variables`, creating input objects
/// on the way.
fn insert_upload(variables: &mut Variables, path: &str, upload: Upload) -> Result<()> {
    let mut keys: Vec<&str> = path.split('.').collect();
    let last = keys
        .pop()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| anyhow!("invalid upload path '{path}'"))?;

    let mut object = variables;
    for key in keys {
        let entry = object
            .entry(key.to_string())
            .or_insert_with(|| VariableValue::Object(Variables::new()));
        if let VariableValue::Json(Value::Object(json)) = entry {
            *entry = VariableValue::Object(uploads::variables_from_object(json));
        }
        object = match entry {
            VariableValue::Object(nested) => nested,
            _ => return Err(anyhow!("'{key}' in upload path '{path}' is not an object")),
        };
    }
    object.insert(last.to_string(), VariableValue::Upload(upload));
    Ok(())
}
