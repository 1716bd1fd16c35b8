//! Main entry point for the `matters-gql` command: sends one operation through
//! the client pipeline and prints the response.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::bail;
use anyhow::Context as _;
use anyhow::Result;
use clap::Parser;
use http::header::COOKIE;
use http::header::HOST;
use http::HeaderMap;
use http::HeaderValue;
use indexmap::IndexMap;
use matters_client::json_ext::Value;
use matters_client::operation::InputValue;
use matters_client::Client;
use matters_client::Configuration;
use matters_client::Context;
use matters_client::Operation;
use matters_client::RenderContext;
use matters_client::Upload;
use tracing_subscriber::EnvFilter;

/// Send a GraphQL operation to the Matters API.
#[derive(Parser, Debug)]
#[command(name = "matters-gql", about = "Send a GraphQL operation to the Matters API")]
struct Opt {
    /// Log level (off|error|warn|info|debug|trace).
    #[arg(long = "log", default_value = "info", env = "MATTERS_CLIENT_LOG")]
    log_level: String,

    /// YAML configuration. Without it, configuration is read from the environment.
    #[arg(short, long = "config", env = "MATTERS_CLIENT_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// Print the configuration JSON schema and exit.
    #[arg(long)]
    schema: bool,

    /// The GraphQL document.
    #[arg(short, long, required_unless_present_any = ["schema", "query_file"])]
    query: Option<String>,

    /// Read the GraphQL document from a file.
    #[arg(long, conflicts_with = "query")]
    query_file: Option<PathBuf>,

    #[arg(long)]
    operation_name: Option<String>,

    /// Variables as a JSON object.
    #[arg(long)]
    variables: Option<String>,

    /// Send the operation without cookies or access token.
    #[arg(long)]
    public: bool,

    /// Attach a file to a variable, as `path.to.variable=./file`. Repeatable.
    #[arg(long = "upload", value_name = "VARIABLE=FILE")]
    uploads: Vec<String>,

    /// The `Cookie` header of the rendered page.
    #[arg(long, env = "MATTERS_CLIENT_COOKIE")]
    cookie: Option<String>,

    /// The host the page is served on.
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let opt = Opt::parse();

    if opt.schema {
        let schema = Configuration::json_schema();
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(ExitCode::SUCCESS);
    }

    let builder = tracing_subscriber::fmt::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_new(&opt.log_level).context("could not parse log configuration")?,
        );
    if std::io::stderr().is_terminal() {
        builder.init();
    } else {
        builder.json().init();
    }

    let configuration = match &opt.config_path {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("could not load {}", path.display()))?,
        None => Configuration::from_env()?,
    };

    let client = Client::builder()
        .configuration(configuration)
        .render_context(render_context(&opt)?)
        .build()?;

    let operation = operation(&opt).await?;
    let is_read = operation.kind().is_read();
    let result = if is_read {
        client.query(operation).await
    } else {
        client.mutate(operation, None).await
    };

    match result {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            tracing::error!(%error, "operation failed");
            println!("{}", serde_json::to_string_pretty(&error.to_graphql_error())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn render_context(opt: &Opt) -> Result<RenderContext> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = &opt.cookie {
        headers.insert(COOKIE, HeaderValue::from_str(cookie).context("invalid cookie")?);
    }
    if let Some(host) = &opt.host {
        headers.insert(HOST, HeaderValue::from_str(host).context("invalid host")?);
    }
    Ok(RenderContext::server(headers))
}

async fn operation(opt: &Opt) -> Result<Operation> {
    let document = match (&opt.query, &opt.query_file) {
        (Some(document), _) => document.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("could not read {}", path.display()))?,
        (None, None) => bail!("--query or --query-file is required"),
    };

    let mut variables: IndexMap<String, InputValue> = match &opt.variables {
        Some(variables) => {
            let variables: Value =
                serde_json::from_str(variables).context("--variables must be JSON")?;
            let Value::Object(variables) = variables else {
                bail!("--variables must be a JSON object");
            };
            variables
                .into_iter()
                .map(|(name, value)| (name.as_str().to_string(), InputValue::Json(value)))
                .collect()
        }
        None => IndexMap::new(),
    };

    for upload in &opt.uploads {
        let Some((path, file)) = upload.split_once('=') else {
            bail!("--upload expects VARIABLE=FILE, got '{upload}'");
        };
        let content = Upload::from_path(file)
            .await
            .with_context(|| format!("could not read {file}"))?;
        let path: Vec<&str> = path.split('.').collect();
        insert_upload(&mut variables, &path, content)?;
    }

    let context = if opt.public {
        Context::public()
    } else {
        Context::new()
    };

    Ok(Operation::builder()
        .document(document)
        .and_operation_name(opt.operation_name.clone())
        .variables(variables)
        .context(context)
        .build())
}

fn insert_upload(
    fields: &mut IndexMap<String, InputValue>,
    path: &[&str],
    upload: Upload,
) -> Result<()> {
    let Some((name, rest)) = path.split_first() else {
        bail!("empty upload variable");
    };
    if rest.is_empty() {
        fields.insert(name.to_string(), upload.into());
        return Ok(());
    }

    let entry = fields
        .entry(name.to_string())
        .or_insert_with(|| InputValue::Object(IndexMap::new()));
    let converted = match entry {
        InputValue::Json(Value::Object(object)) => Some(
            object
                .iter()
                .map(|(key, value)| (key.as_str().to_string(), InputValue::Json(value.clone())))
                .collect(),
        ),
        _ => None,
    };
    if let Some(converted) = converted {
        *entry = InputValue::Object(converted);
    }
    match entry {
        InputValue::Object(inner) => insert_upload(inner, rest, upload),
        _ => bail!("variable '{name}' is not an input object"),
    }
}
