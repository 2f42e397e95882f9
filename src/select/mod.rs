//! Tier-aware, cost-aware model selection.
//!
//! Combines the classifier's category, the catalog's per-category
//! ranks, the caller's subscription tier, and any temporary
//! premium-credit allowance to choose exactly one model. Intentionally
//! a pure lookup over the catalog — no state, no network.

use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::classify::estimate_tokens;
use crate::types::{PromptAnalysis, TaskCategory, Tier, Turn};

/// Flat token allowance added for the expected response when
/// estimating a request's total size.
const RESPONSE_TOKEN_ALLOWANCE: u32 = 500;

/// Outcome of model selection for one request.
#[derive(Debug, Clone)]
pub struct Selection {
    /// The chosen model.
    pub model: ModelDescriptor,
    /// Human-readable explanation of the choice.
    pub reason: String,
    /// Category the prompt classified as.
    pub category: TaskCategory,
    /// Estimated total tokens: prompt + history + response allowance.
    pub estimated_tokens: u32,
    /// Whether the chosen model requires pro tier or higher.
    pub is_premium: bool,
    /// Display name of a strictly better pick one tier up, when one
    /// exists. Surfaced for upselling; never affects routing.
    pub better_model_available: Option<String>,
}

/// Select the optimal model for an analyzed prompt.
///
/// The effective tier is upgraded one level when the caller holds an
/// unused premium credit, independent of the paid tier. Candidates must
/// be reachable at the effective tier, serve the classified category,
/// and not appear in `exhausted` (models whose monthly token cap is
/// spent). The lowest rank for the category wins; ties break toward the
/// cheapest blended cost per token.
///
/// A catalog so misconfigured that nothing is eligible falls back to
/// the designated default model rather than failing the request.
pub fn select_model(
    catalog: &ModelCatalog,
    analysis: &PromptAnalysis,
    tier: Tier,
    history: &[Turn],
    has_premium_credit: bool,
    exhausted: &[&str],
) -> Selection {
    let effective_tier = if has_premium_credit {
        tier.upgraded()
    } else {
        tier
    };

    let history_tokens: u32 = history.iter().map(|t| estimate_tokens(&t.content)).sum();
    let estimated_tokens =
        analysis.estimated_input_tokens + history_tokens + RESPONSE_TOKEN_ALLOWANCE;

    let selected = catalog
        .best_for(analysis.category, effective_tier, exhausted)
        .unwrap_or_else(|| catalog.default_model())
        .clone();

    let better_model_available = better_at_next_tier(
        catalog,
        analysis.category,
        effective_tier,
        exhausted,
        &selected,
    );

    let is_premium = selected.minimum_tier >= Tier::Pro;
    let used_premium_credit = has_premium_credit && is_premium && tier < selected.minimum_tier;

    let reason = selection_reason(
        &selected,
        analysis.category,
        analysis.confidence,
        used_premium_credit,
    );

    Selection {
        model: selected,
        reason,
        category: analysis.category,
        estimated_tokens,
        is_premium,
        better_model_available,
    }
}

/// Display name of the best pick one tier up, when it beats the
/// current winner.
fn better_at_next_tier(
    catalog: &ModelCatalog,
    category: TaskCategory,
    effective_tier: Tier,
    exhausted: &[&str],
    selected: &ModelDescriptor,
) -> Option<String> {
    let next = effective_tier.upgraded();
    if next == effective_tier {
        return None;
    }
    catalog
        .best_for(category, next, exhausted)
        .filter(|better| better.id != selected.id)
        .map(|better| better.display_name.clone())
}

/// Build a user-facing explanation of why this model was chosen.
fn selection_reason(
    model: &ModelDescriptor,
    category: TaskCategory,
    confidence: f32,
    used_premium_credit: bool,
) -> String {
    let desc = category.description();

    if used_premium_credit {
        return format!("{} excels at {} (premium answer)", model.display_name, desc);
    }

    if confidence > 0.7 {
        format!(
            "{} excels at {} (top ranked in your tier)",
            model.display_name, desc
        )
    } else if confidence > 0.4 {
        format!("{} performs well for {}", model.display_name, desc)
    } else {
        format!(
            "{} is a versatile choice for your request",
            model.display_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::analyze_prompt;

    fn catalog() -> ModelCatalog {
        ModelCatalog::builtin().unwrap()
    }

    fn analysis_for(category: TaskCategory) -> PromptAnalysis {
        PromptAnalysis {
            category,
            confidence: 0.8,
            estimated_input_tokens: 10,
        }
    }

    #[test]
    fn prime_prompt_scenario_selects_free_coding_model() {
        let catalog = catalog();
        let analysis = analyze_prompt("Write a function to check if a number is prime");
        assert_eq!(analysis.category, TaskCategory::Coding);
        assert!(analysis.confidence > 0.4);

        let selection = select_model(&catalog, &analysis, Tier::Free, &[], false, &[]);
        assert_eq!(selection.model.id, "gpt-4o-mini");
        assert!(!selection.is_premium);
        // A strictly better coding model exists one tier up.
        assert_eq!(
            selection.better_model_available.as_deref(),
            Some("Claude 3.5 Haiku")
        );
    }

    #[test]
    fn tier_monotonicity_for_every_category() {
        let catalog = catalog();
        for category in TaskCategory::ALL {
            let analysis = analysis_for(category);
            let free = select_model(&catalog, &analysis, Tier::Free, &[], false, &[]);
            let pro = select_model(&catalog, &analysis, Tier::Pro, &[], false, &[]);
            let unlimited = select_model(&catalog, &analysis, Tier::Unlimited, &[], false, &[]);

            let rank = |s: &Selection| s.model.rank_for(category).unwrap();
            assert!(
                rank(&pro) <= rank(&free),
                "pro rank regressed for {category}"
            );
            assert!(
                rank(&unlimited) <= rank(&pro),
                "unlimited rank regressed for {category}"
            );
        }
    }

    #[test]
    fn premium_credit_upgrades_one_tier() {
        let catalog = catalog();
        let analysis = analysis_for(TaskCategory::Coding);

        let without = select_model(&catalog, &analysis, Tier::Free, &[], false, &[]);
        assert_eq!(without.model.id, "gpt-4o-mini");

        let with = select_model(&catalog, &analysis, Tier::Free, &[], true, &[]);
        assert_eq!(with.model.id, "claude-3-5-haiku");
        assert!(with.is_premium);
        assert!(with.reason.contains("premium answer"));
    }

    #[test]
    fn history_feeds_token_estimate() {
        let catalog = catalog();
        let analysis = analysis_for(TaskCategory::Casual);
        let history = vec![Turn::user("x".repeat(400)), Turn::assistant("y".repeat(400))];

        let bare = select_model(&catalog, &analysis, Tier::Free, &[], false, &[]);
        let loaded = select_model(&catalog, &analysis, Tier::Free, &history, false, &[]);
        assert_eq!(loaded.estimated_tokens, bare.estimated_tokens + 200);
    }

    #[test]
    fn exhausted_model_is_skipped() {
        let catalog = catalog();
        let analysis = analysis_for(TaskCategory::Casual);

        let normal = select_model(&catalog, &analysis, Tier::Free, &[], false, &[]);
        assert_eq!(normal.model.id, "gemini-2.0-flash");

        let capped = select_model(
            &catalog,
            &analysis,
            Tier::Free,
            &[],
            false,
            &["gemini-2.0-flash"],
        );
        assert_eq!(capped.model.id, "gpt-4o-mini");
    }

    #[test]
    fn empty_candidates_fall_back_to_default_model() {
        // A catalog whose only creative-capable model sits behind a
        // preferred-categories wall for math.
        let doc = r#"{
            "version": 1,
            "default_model": "fallback",
            "models": [
                {
                    "id": "fallback", "provider": "openai", "display_name": "Fallback",
                    "cost_per_million_input_tokens": 0.1,
                    "cost_per_million_output_tokens": 0.2,
                    "max_context_tokens": 1000, "supports_streaming": true,
                    "rank_by_category": {"casual": 1}, "minimum_tier": "free"
                },
                {
                    "id": "math-only", "provider": "openai", "display_name": "Math Only",
                    "cost_per_million_input_tokens": 1.0,
                    "cost_per_million_output_tokens": 2.0,
                    "max_context_tokens": 1000, "supports_streaming": true,
                    "rank_by_category": {"math": 1}, "minimum_tier": "free",
                    "preferred_categories": ["math"]
                }
            ]
        }"#;
        let catalog = ModelCatalog::from_json_str(doc).unwrap();
        let analysis = analysis_for(TaskCategory::Creative);

        let selection = select_model(&catalog, &analysis, Tier::Free, &[], false, &[]);
        assert_eq!(selection.model.id, "fallback");
    }

    #[test]
    fn unlimited_tier_surfaces_no_upsell() {
        let catalog = catalog();
        let analysis = analysis_for(TaskCategory::Coding);
        let selection = select_model(&catalog, &analysis, Tier::Unlimited, &[], false, &[]);
        assert!(selection.better_model_available.is_none());
    }

    #[test]
    fn low_confidence_reason_is_generic() {
        let catalog = catalog();
        let analysis = PromptAnalysis {
            category: TaskCategory::Casual,
            confidence: 0.3,
            estimated_input_tokens: 5,
        };
        let selection = select_model(&catalog, &analysis, Tier::Free, &[], false, &[]);
        assert!(selection.reason.contains("versatile choice"));
    }
}
