//! CLI command implementations.

pub mod list;
mod prompt;

use anyhow::{Context, Result};
use dockyard_config::predefined::PredefinedVariables;
use dockyard_config::{ConfigLoader, VariableResolver};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::debug;

use prompt::TerminalInput;

/// Flags shared by every command.
pub struct ResolveOptions {
    pub config: Option<PathBuf>,
    pub profile: Option<String>,
    pub vars: Vec<String>,
    pub interactive: bool,
}

impl ResolveOptions {
    fn open(&self) -> Result<ConfigLoader> {
        match &self.config {
            Some(path) => ConfigLoader::open(path)
                .with_context(|| format!("Failed to load config file: {}", path.display())),
            None => {
                let dir = std::env::current_dir().context("Failed to read working directory")?;
                ConfigLoader::find(&dir).context("Failed to load project configuration")
            }
        }
    }

    fn variables(&self, loader: &ConfigLoader) -> Result<VariableResolver> {
        debug!(
            project = %loader.project_dir().display(),
            overrides = self.vars.len(),
            "building variable resolver"
        );
        let mut builder = VariableResolver::builder()
            .with_predefined(PredefinedVariables::new(loader.project_dir()));
        if self.interactive && std::io::stdin().is_terminal() {
            builder = builder.with_input(TerminalInput);
        }

        let mut resolver = builder.build();
        resolver
            .convert_flags(&self.vars)
            .context("Invalid --var override")?;
        Ok(resolver)
    }
}

pub fn print(options: &ResolveOptions) -> Result<()> {
    let loader = options.open()?;
    let mut variables = options.variables(&loader)?;
    let resolved = loader
        .resolve(options.profile.as_deref(), &mut variables)
        .context("Failed to resolve configuration")?;

    print!("{}", serde_yaml::to_string(&resolved)?);
    Ok(())
}

pub fn validate(options: &ResolveOptions) -> Result<()> {
    let loader = options.open()?;
    let mut variables = options.variables(&loader)?;
    let config = loader
        .load(options.profile.as_deref(), &mut variables)
        .context("Configuration is invalid")?;

    println!("Configuration is valid: {}", loader.path().display());
    if let Some(profile) = &options.profile {
        println!("  Profile:     {}", profile);
    }
    println!("  Images:      {}", config.images.len());
    println!("  Deployments: {}", config.deployments.len());
    println!("  Variables:   {}", variables.resolved_variables().len());
    Ok(())
}
