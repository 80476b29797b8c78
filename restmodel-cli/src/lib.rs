//! Command-line client driving restmodel models against a REST endpoint.
//!
//! Each command defines a model for the named resource on the fly, runs one
//! record or collection operation and returns the local attributes as JSON.

mod config;

pub use config::{CliConfig, ResourceConfig};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use restmodel_core::{Api, CommonApi, Define, Model, NamingStyle, Record, ScopeApi};
use restmodel_http::HttpTransport;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "restmodel")]
#[command(about = "Fetch, list and modify REST resources")]
pub struct Args {
    /// Base URL every resource URL is resolved against
    #[arg(short, long)]
    pub base_url: Option<String>,

    /// Path to a JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Raw field holding the primary key
    #[arg(long)]
    pub primary_key: Option<String>,

    /// Server uses snake_case attribute names
    #[arg(long)]
    pub snake_case: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch one record
    Get {
        resource: String,
        id: String,
        /// Query parameter, as key=value
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Fetch a collection
    List {
        resource: String,
        /// Query parameter, as key=value
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Create a record from a JSON object
    Create {
        resource: String,
        #[arg(short, long)]
        data: String,
    },
    /// Update a record with a JSON object
    Update {
        resource: String,
        id: String,
        #[arg(short, long)]
        data: String,
        /// Send only these attribute paths
        #[arg(long)]
        patch: Vec<String>,
    },
    /// Delete a record
    Delete { resource: String, id: String },
}

impl Command {
    fn resource(&self) -> &str {
        match self {
            Command::Get { resource, .. }
            | Command::List { resource, .. }
            | Command::Create { resource, .. }
            | Command::Update { resource, .. }
            | Command::Delete { resource, .. } => resource,
        }
    }
}

/// Runs one command and returns its JSON output.
pub async fn run(args: Args) -> Result<Value> {
    let mut config = match &args.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    if let Some(base) = args.base_url {
        config.api.url_prefix = Some(base);
    }
    if let Some(pk) = args.primary_key {
        config.api.primary_key = pk;
    }
    if args.snake_case {
        config.api.naming = NamingStyle::SnakeCase;
    }
    if config.api.url_prefix.is_none() {
        bail!("no base URL: pass --base-url or set api.url_prefix in the config file");
    }

    let transport = HttpTransport::new(config.http.clone()).context("failed to build HTTP client")?;
    let api = Api::with_config(Arc::new(transport), config.api.clone());
    let model = define(&api, &config, args.command.resource())?;
    debug!(model = %model.name(), url = ?model.url(), "resource defined");

    match args.command {
        Command::Get { id, params, .. } => {
            let record = model.find(parse_id(&id), Some(params.into_iter().collect())).context("fetch failed")?;
            Ok(attributes(&record.as_promise().await?))
        }
        Command::List { params, .. } => {
            let collection = model.search(params.into_iter().collect())?.as_promise().await?;
            info!(count = collection.len(), "fetched collection");
            Ok(Value::Array(collection.records().iter().map(attributes).collect()))
        }
        Command::Create { data, .. } => {
            let record = model.create(parse_object(&data)?)?.as_promise().await?;
            Ok(attributes(&record))
        }
        Command::Update { id, data, patch, .. } => {
            let record = model.new_record(Some(parse_id(&id)))?.extend(parse_object(&data)?);
            let record = if patch.is_empty() {
                record.save()?
            } else {
                record.save_patch(patch)?
            };
            Ok(attributes(&record.as_promise().await?))
        }
        Command::Delete { id, .. } => {
            let pk = parse_id(&id);
            model.new_record(Some(pk.clone()))?.destroy()?.as_promise().await?;
            Ok(json!({ "deleted": pk }))
        }
    }
}

fn define(api: &Api, config: &CliConfig, resource: &str) -> Result<Model> {
    let rules = config.resources.get(resource).cloned().unwrap_or_default();
    let url = rules.url.clone().unwrap_or_else(|| format!("/{resource}"));
    let builder = rules.apply(api.define(resource).url(&url))?;
    Ok(builder.build()?)
}

fn attributes(record: &Record) -> Value {
    Value::Object(record.attributes())
}

/// Numeric ids are sent as numbers, anything else as a string.
fn parse_id(id: &str) -> Value {
    id.parse::<i64>().map_or_else(|_| json!(id), Value::from)
}

fn parse_object(data: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(data).context("--data is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--data must be a JSON object, got {other}"),
    }
}

/// Parses `key=value`; the value is read as JSON when it parses, else as a
/// string.
fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| json!(value));
    Ok((key.to_string(), value))
}
