//! Selectable models for pickers and `models` listings.

use crate::resolver::ModelResolver;
use crate::{GATEWAY_TOKEN_ENV, ModelConfig};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Providers reachable through a models gateway.
const GATEWAY_PROVIDERS: &[&str] = &["openai", "anthropic", "google", "mistral", "xai"];

/// API-key variable per provider.
const PROVIDER_KEY_ENV: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("google", "GOOGLE_API_KEY"),
    ("mistral", "MISTRAL_API_KEY"),
    ("xai", "XAI_API_KEY"),
    ("nebius", "NEBIUS_API_KEY"),
    ("requesty", "REQUESTY_API_KEY"),
    ("azure", "AZURE_API_KEY"),
];

/// Local runtimes that need no credentials.
const LOCAL_PROVIDERS: &[&str] = &["dmr", "ollama"];

/// Any of these suggests AWS credentials are available. Instance profiles
/// and SSO are not detected.
const AWS_CREDENTIAL_INDICATORS: &[&str] = &[
    "AWS_ACCESS_KEY_ID",
    "AWS_PROFILE",
    "AWS_DEFAULT_PROFILE",
    "AWS_WEB_IDENTITY_TOKEN_FILE",
    "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI",
    "AWS_ROLE_ARN",
];

/// One row in a model picker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelChoice {
    /// Display name: the config key, or the catalog's model name.
    pub name: String,
    /// What to pass back to the resolver.
    pub reference: String,
    pub provider: String,
    pub model: String,
    /// The agent's configured default.
    pub is_default: bool,
    /// The model currently in use.
    pub is_current: bool,
    /// Came from session history rather than config.
    pub is_custom: bool,
    /// Came from the models catalog.
    pub is_catalog: bool,
}

impl ModelResolver {
    /// List selectable models.
    ///
    /// Configured models come first (sorted by name), then `custom_refs` not
    /// already listed, then catalog entries sorted by reference. `current_ref`
    /// marks the active choice; when `None`, the default is current.
    pub async fn available_models(
        &self,
        default_ref: Option<&str>,
        current_ref: Option<&str>,
        custom_refs: &[String],
    ) -> Vec<ModelChoice> {
        let mut names: Vec<_> = self.models().keys().collect();
        names.sort();

        let mut choices: Vec<ModelChoice> = names
            .into_iter()
            .map(|name| {
                let config = &self.models()[name];
                ModelChoice {
                    name: name.clone(),
                    reference: name.clone(),
                    provider: config.provider.clone(),
                    model: config.model.clone(),
                    is_default: default_ref == Some(name.as_str()),
                    ..ModelChoice::default()
                }
            })
            .collect();

        let mut known = self.configured_refs();
        for reference in custom_refs {
            let reference = reference.trim();
            if reference.is_empty() || !known.insert(reference.to_string()) {
                continue;
            }
            let (provider, model) = match ModelConfig::parse_inline(reference) {
                Some(config) => (config.provider, config.model),
                None => (String::new(), reference.to_string()),
            };
            choices.push(ModelChoice {
                name: reference.to_string(),
                reference: reference.to_string(),
                provider,
                model,
                is_custom: true,
                ..ModelChoice::default()
            });
        }

        choices.extend(self.catalog_choices(&mut known).await);

        if let Some(current) = current_ref.or(default_ref) {
            if let Some(choice) = choices.iter_mut().find(|c| c.reference == current) {
                choice.is_current = true;
            }
        }

        choices
    }

    /// Providers the caller appears to hold credentials for.
    pub async fn available_providers(&self) -> BTreeSet<String> {
        let env = self.env();
        let mut available = BTreeSet::new();

        if self.gateway().is_some() {
            if env.get_non_empty(GATEWAY_TOKEN_ENV).await.is_some() {
                available.extend(GATEWAY_PROVIDERS.iter().map(|p| p.to_string()));
            }
            return available;
        }

        for (provider, var) in PROVIDER_KEY_ENV {
            if env.get_non_empty(var).await.is_some() {
                available.insert(provider.to_string());
            }
        }

        available.extend(LOCAL_PROVIDERS.iter().map(|p| p.to_string()));

        for var in AWS_CREDENTIAL_INDICATORS {
            if env.get_non_empty(var).await.is_some() {
                available.insert("amazon-bedrock".to_string());
                break;
            }
        }

        available
    }

    /// Names and `provider/model` forms of every configured model.
    fn configured_refs(&self) -> HashSet<String> {
        let mut refs = HashSet::new();
        for (name, config) in self.models() {
            refs.insert(name.clone());
            if !config.provider.is_empty() && !config.model.is_empty() {
                refs.insert(config.reference());
            }
        }
        refs
    }

    async fn catalog_choices(&self, known: &mut HashSet<String>) -> Vec<ModelChoice> {
        let Some(catalog) = &self.catalog else {
            debug!("no catalog store configured, skipping catalog models");
            return Vec::new();
        };

        let database = match catalog.get_database().await {
            Ok(database) => database,
            Err(err) => {
                debug!(%err, "failed to load catalog, skipping catalog models");
                return Vec::new();
            }
        };

        let available = self.available_providers().await;
        if available.is_empty() {
            debug!("no provider credentials available, skipping catalog models");
            return Vec::new();
        }

        let mut choices = Vec::new();
        for (provider_id, provider) in &database.providers {
            if !self.registry().contains(provider_id) || !available.contains(provider_id) {
                continue;
            }

            for (model_id, model) in &provider.models {
                if !model.outputs_text() || model.is_embedding() {
                    continue;
                }

                let reference = format!("{provider_id}/{model_id}");
                if !known.insert(reference.clone()) {
                    continue;
                }

                choices.push(ModelChoice {
                    name: model.name.clone(),
                    reference,
                    provider: provider_id.clone(),
                    model: model_id.clone(),
                    is_catalog: true,
                    ..ModelChoice::default()
                });
            }
        }

        choices.sort_by(|a, b| a.reference.cmp(&b.reference));
        debug!(
            count = choices.len(),
            available_providers = available.len(),
            "built catalog choices"
        );
        choices
    }
}
