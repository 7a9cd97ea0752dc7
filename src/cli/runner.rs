//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::{CatalogStream, ConfiguredCatalog, ConfiguredStream};
use crate::connector::Connector;
use crate::connectors::FileConnector;
use crate::engine::SyncEngine;
use crate::error::{Error, Result, ResultExt};
use crate::protocol::{CheckStatus, Message};
use crate::state::StateManager;
use crate::types::{JsonValue, SyncMode};
use futures::StreamExt;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Spec => self.spec(),
            Commands::Check => self.check().await,
            Commands::Discover => self.discover().await,
            Commands::Read { catalog, streams } => {
                self.read(catalog.as_deref(), streams.as_deref()).await
            }
            Commands::Validate => self.validate(),
        }
    }

    /// Load connector definition
    fn load_connector(&self) -> Result<FileConnector> {
        let path = self
            .cli
            .connector
            .as_ref()
            .ok_or_else(|| Error::config("Connector file not specified (use -c flag)"))?;
        FileConnector::from_file(path)
    }

    /// Load configuration
    fn load_config(&self) -> Result<JsonValue> {
        // Inline config takes precedence
        if let Some(json_str) = &self.cli.config_json {
            return serde_json::from_str(json_str)
                .map_err(|e| Error::config(format!("Invalid config JSON: {e}")));
        }

        if let Some(path) = &self.cli.config {
            let content = fs::read_to_string(path)
                .map_err(|e| Error::config(format!("Failed to read config file: {e}")))?;
            return serde_json::from_str(&content)
                .map_err(|e| Error::config(format!("Invalid config JSON: {e}")));
        }

        Ok(json!({}))
    }

    /// Load the prior state blob, if any
    async fn load_state(&self) -> Result<Option<JsonValue>> {
        if let Some(state_json) = &self.cli.state_json {
            return serde_json::from_str(state_json)
                .map(Some)
                .map_err(|e| Error::state(format!("Invalid state JSON: {e}")));
        }

        match &self.cli.state {
            Some(path) => StateManager::new(path).load().await,
            None => Ok(None),
        }
    }

    /// Print the configuration schema
    fn spec(&self) -> Result<()> {
        let connector = self.load_connector()?;
        self.output_message(&connector.spec().to_message())
    }

    /// Validate connector definition
    fn validate(&self) -> Result<()> {
        let connector = self.load_connector()?;
        let definition = connector.definition();

        self.output_message(&Message::info(format!(
            "Connector '{}' v{} is valid with {} streams",
            definition.name,
            definition.version,
            definition.streams.len()
        )))
    }

    /// Check configuration and source access
    async fn check(&self) -> Result<()> {
        let connector = self.load_connector()?;
        let config = self.load_config()?;

        self.output_message(&Message::info(format!(
            "Checking connector {}",
            connector.definition().name
        )))?;

        let message = match connector.check(&config).await {
            Ok(result) if result.success => Message::connection_status(
                CheckStatus::Succeeded,
                Some("Connection successful".to_string()),
            ),
            Ok(result) => Message::connection_status(CheckStatus::Failed, result.message),
            Err(e) => Message::connection_status(
                CheckStatus::Failed,
                Some(format!("Connection failed: {e}")),
            ),
        };
        self.output_message(&message)
    }

    /// Discover streams
    async fn discover(&self) -> Result<()> {
        let connector = self.load_connector()?;
        let config = self.load_config()?;

        let catalog = connector.discover(&config).await?;
        self.output_message(&Message::catalog(catalog))
    }

    /// Build the configured catalog for a read
    async fn configured_catalog(
        &self,
        connector: &FileConnector,
        config: &JsonValue,
        catalog_path: Option<&std::path::Path>,
        streams: Option<&str>,
    ) -> Result<ConfiguredCatalog> {
        let catalog = match catalog_path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read catalog {}", path.display()))?;
                serde_json::from_str(&content)
                    .map_err(|e| Error::config(format!("Invalid catalog JSON: {e}")))?
            }
            None => connector.discover(config).await?.configure_all(),
        };

        let Some(streams) = streams.filter(|s| !s.trim().is_empty()) else {
            return Ok(catalog);
        };

        // Unknown names are kept so the sync reports them
        let selected = streams
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                catalog.get(name).cloned().unwrap_or_else(|| {
                    ConfiguredStream::new(CatalogStream::new(name), SyncMode::FullRefresh)
                })
            })
            .collect();

        Ok(ConfiguredCatalog { streams: selected })
    }

    /// Read data from streams
    async fn read(
        &self,
        catalog_path: Option<&std::path::Path>,
        streams: Option<&str>,
    ) -> Result<()> {
        let connector = self.load_connector()?;
        let config = self.load_config()?;
        let state = self.load_state().await?;
        let catalog = self
            .configured_catalog(&connector, &config, catalog_path, streams)
            .await?;

        info!(streams = ?catalog.stream_names(), "Reading");

        let engine = SyncEngine::new(Arc::new(connector));
        let mut messages = engine.read(config, catalog, state);
        let mut last_state: Option<JsonValue> = None;
        let mut failure = None;

        while let Some(item) = messages.next().await {
            match item {
                Ok(message) => {
                    if let Some(blob) = message.as_state() {
                        last_state = Some(blob.clone());
                    }
                    self.output_message(&message)?;
                }
                Err(e) => {
                    self.output_message(&Message::error(format!("Sync failed: {e}")))?;
                    failure = Some(e);
                }
            }
        }

        // Persist the last checkpoint even after a failure so the next run resumes
        if let (Some(path), Some(blob)) = (&self.cli.state, &last_state) {
            if let Err(e) = StateManager::new(path).save(blob).await {
                warn!(error = %e, "Failed to save state");
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Output a protocol message
    fn output_message(&self, message: &Message) -> Result<()> {
        match self.cli.format {
            OutputFormat::Json => println!("{}", message.to_line()?),
            OutputFormat::Pretty => println!("{}", serde_json::to_string_pretty(message)?),
        }
        Ok(())
    }
}
