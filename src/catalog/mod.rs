//! Model catalog — versioned model metadata and failover chains.
//!
//! The catalog holds [`ModelDescriptor`] entries plus the failover
//! chains that name each model's substitutes. Both are configuration
//! data loaded at startup:
//!
//! 1. **Embedded seed** — compiled-in JSON, always available
//! 2. **Operator documents** — [`ModelCatalog::from_json_str`]
//!
//! Every document is validated on load: failover chains may only
//! reference ids that exist in the catalog, may not name a model as its
//! own substitute, and the designated default model must exist. A chain
//! referencing a since-removed model is therefore a load-time
//! configuration error, not a latent request-time crash.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{TaskCategory, Tier};
use crate::{ModelmuxError, Result};

/// Upstream vendor a model is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderKind {
    /// Stable wire/label name (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static metadata for one routable model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub provider: ProviderKind,
    pub display_name: String,
    /// USD per million input tokens.
    pub cost_per_million_input_tokens: f64,
    /// USD per million output tokens.
    pub cost_per_million_output_tokens: f64,
    pub max_context_tokens: u32,
    /// Some reasoning-oriented models only return a complete response;
    /// the orchestrator adapts those to the streaming interface.
    pub supports_streaming: bool,
    /// Capability rank per category, lower is better. A model with no
    /// rank for a category is not considered for it.
    pub rank_by_category: HashMap<TaskCategory, u8>,
    /// Lowest tier that may select this model.
    pub minimum_tier: Tier,
    /// When present, restricts the model to these categories regardless
    /// of rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_categories: Option<Vec<TaskCategory>>,
    /// Hard monthly token ceiling for this model, independent of any
    /// tier quota.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_token_cap: Option<u64>,
}

impl ModelDescriptor {
    /// Capability rank for a category, if the model is ranked for it.
    pub fn rank_for(&self, category: TaskCategory) -> Option<u8> {
        self.rank_by_category.get(&category).copied()
    }

    /// Whether the model serves a category, honoring
    /// `preferred_categories` when declared.
    pub fn serves_category(&self, category: TaskCategory) -> bool {
        match &self.preferred_categories {
            Some(preferred) => preferred.contains(&category),
            None => true,
        }
    }

    /// Blended USD cost per token, used as the selection tie-breaker.
    pub fn average_cost_per_token(&self) -> f64 {
        (self.cost_per_million_input_tokens + self.cost_per_million_output_tokens)
            / 2.0
            / 1_000_000.0
    }
}

/// On-disk/in-config shape of a catalog document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogDocument {
    /// Document schema version; bumped when the shape changes.
    version: u32,
    default_model: String,
    models: Vec<ModelDescriptor>,
    #[serde(default)]
    failover_chains: HashMap<String, Vec<String>>,
}

/// Validated, immutable model catalog.
///
/// Cheap to share (`Arc<ModelCatalog>`); read-only at request time.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: HashMap<String, ModelDescriptor>,
    chains: HashMap<String, Vec<String>>,
    default_model: String,
    version: u32,
}

impl ModelCatalog {
    /// Load the compiled-in seed catalog.
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(EMBEDDED_SEED)
    }

    /// Parse and validate a catalog document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    fn from_document(doc: CatalogDocument) -> Result<Self> {
        let mut models = HashMap::with_capacity(doc.models.len());
        for model in doc.models {
            if models.insert(model.id.clone(), model).is_some() {
                return Err(ModelmuxError::Configuration(
                    "duplicate model id in catalog".into(),
                ));
            }
        }

        if !models.contains_key(&doc.default_model) {
            return Err(ModelmuxError::Configuration(format!(
                "default model '{}' is not in the catalog",
                doc.default_model
            )));
        }

        for (from, chain) in &doc.failover_chains {
            if !models.contains_key(from) {
                return Err(ModelmuxError::Configuration(format!(
                    "failover chain declared for unknown model '{from}'"
                )));
            }
            for substitute in chain {
                if !models.contains_key(substitute) {
                    return Err(ModelmuxError::Configuration(format!(
                        "failover chain for '{from}' references unknown model '{substitute}'"
                    )));
                }
                if substitute == from {
                    return Err(ModelmuxError::Configuration(format!(
                        "failover chain for '{from}' references itself"
                    )));
                }
            }
        }

        Ok(Self {
            models,
            chains: doc.failover_chains,
            default_model: doc.default_model,
            version: doc.version,
        })
    }

    /// Document schema version this catalog was loaded from.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Look up a model by id.
    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.get(id)
    }

    /// Iterate over all models (unordered).
    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    /// Number of models in the catalog.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog holds no models.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// The designated fallback when no model is otherwise eligible.
    pub fn default_model(&self) -> &ModelDescriptor {
        // Validated at construction: the id is always present.
        &self.models[&self.default_model]
    }

    /// Models reachable from a tier (every model with
    /// `minimum_tier <= tier`).
    pub fn models_for_tier(&self, tier: Tier) -> Vec<&ModelDescriptor> {
        self.models
            .values()
            .filter(|m| m.minimum_tier <= tier)
            .collect()
    }

    /// Best model for a category at a tier: lowest rank, ties broken by
    /// lowest blended cost per token, then id for determinism.
    ///
    /// Models excluded: unreachable tier, unranked for the category,
    /// category outside `preferred_categories`, or listed in `excluded`
    /// (e.g. monthly token cap spent).
    pub fn best_for(
        &self,
        category: TaskCategory,
        tier: Tier,
        excluded: &[&str],
    ) -> Option<&ModelDescriptor> {
        self.models
            .values()
            .filter(|m| m.minimum_tier <= tier)
            .filter(|m| m.serves_category(category))
            .filter(|m| !excluded.contains(&m.id.as_str()))
            .filter_map(|m| m.rank_for(category).map(|rank| (rank, m)))
            .min_by(|(rank_a, a), (rank_b, b)| {
                rank_a
                    .cmp(rank_b)
                    .then(
                        a.average_cost_per_token()
                            .total_cmp(&b.average_cost_per_token()),
                    )
                    .then(a.id.cmp(&b.id))
            })
            .map(|(_, m)| m)
    }

    /// The failover chain for a model (empty when none is declared).
    pub fn failover_chain(&self, model_id: &str) -> &[String] {
        self.chains
            .get(model_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First substitute in `original`'s chain not yet attempted.
    ///
    /// Ids missing from the catalog are skipped defensively, so a
    /// hand-edited document degrades to a shorter chain at request time.
    pub fn next_substitute(
        &self,
        original: &str,
        attempted: &[String],
    ) -> Option<&ModelDescriptor> {
        self.failover_chain(original)
            .iter()
            .filter(|id| !attempted.contains(id))
            .find_map(|id| self.models.get(id))
    }

    /// USD cost of a completed request. Unknown models cost nothing.
    pub fn cost_for(&self, model_id: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        let Some(model) = self.models.get(model_id) else {
            return 0.0;
        };
        let input = f64::from(input_tokens) / 1_000_000.0 * model.cost_per_million_input_tokens;
        let output = f64::from(output_tokens) / 1_000_000.0 * model.cost_per_million_output_tokens;
        input + output
    }
}

/// Raw JSON seed data compiled into the binary.
const EMBEDDED_SEED: &str = include_str!("seed.json");
