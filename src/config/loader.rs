use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::filters::{StaticFilters, VARS_PREFIX};
use crate::providers::FilterEvaluator;
use crate::routes::{MaxCost, EVENT_COST};

use super::types::Config;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let ratio = self.settings.default_ratio;
        if !ratio.is_finite() || ratio <= 0.0 {
            anyhow::bail!("default_ratio must be a positive number, got {}", ratio);
        }

        let rate = self.telemetry.trace_sample_rate;
        if !(0.0..=1.0).contains(&rate) {
            anyhow::bail!("trace_sample_rate must be within 0.0 and 1.0, got {}", rate);
        }

        match self.settings.rank.max_cost {
            Some(MaxCost::Fixed(cost)) if cost.is_nan() => {
                anyhow::bail!("rank.max_cost must be a number");
            }
            Some(MaxCost::EventCost) if self.settings.event_rating_plans.is_empty() => {
                anyhow::bail!("rank.max_cost {} needs settings.event_rating_plans", EVENT_COST);
            }
            _ => {}
        }

        // Compiling catches duplicate IDs and broken conditions
        let filters = StaticFilters::from_definitions(&self.filters)
            .context("invalid filter definition")?;

        let mut plan_ids = HashSet::new();
        for plan in &self.rating_plans {
            if !plan_ids.insert(plan.id.as_str()) {
                anyhow::bail!("duplicate rating plan: {}", plan.id);
            }
        }

        for plan_id in &self.settings.event_rating_plans {
            if !plan_ids.contains(plan_id.as_str()) {
                anyhow::bail!("settings.event_rating_plans references unknown rating plan: {}", plan_id);
            }
        }

        let mut profile_ids = HashSet::new();
        for profile in &self.profiles {
            if !profile_ids.insert((profile.tenant.as_str(), profile.id.as_str())) {
                anyhow::bail!("duplicate route profile: {}", profile.tenant_id());
            }

            profile
                .validate()
                .with_context(|| format!("route profile '{}'", profile.tenant_id()))?;

            for filter_id in &profile.filter_ids {
                if !filters.resolves(filter_id) {
                    anyhow::bail!(
                        "route profile '{}' references unknown filter: {}",
                        profile.tenant_id(),
                        filter_id
                    );
                }
            }
            if filters.has_lazy_conditions(&profile.filter_ids) {
                anyhow::bail!(
                    "route profile '{}' filters on {} which only routes carry",
                    profile.tenant_id(),
                    VARS_PREFIX
                );
            }

            for route in &profile.routes {
                if route.id.is_empty() {
                    anyhow::bail!("route profile '{}' has a route without ID", profile.tenant_id());
                }
                if !route.weight.is_finite() {
                    anyhow::bail!(
                        "route '{}' in profile '{}' has a non-finite weight",
                        route.id,
                        profile.tenant_id()
                    );
                }
                for filter_id in &route.filter_ids {
                    if !filters.resolves(filter_id) {
                        anyhow::bail!(
                            "route '{}' in profile '{}' references unknown filter: {}",
                            route.id,
                            profile.tenant_id(),
                            filter_id
                        );
                    }
                }
                for plan_id in &route.rating_plan_ids {
                    if !plan_ids.contains(plan_id.as_str()) {
                        warn!(
                            profile = %profile.tenant_id(),
                            route = %route.id,
                            rating_plan = %plan_id,
                            "route references unknown rating plan"
                        );
                    }
                }
            }
        }

        info!(
            profiles = self.profiles.len(),
            filters = self.filters.len(),
            rating_plans = self.rating_plans.len(),
            "configuration validated successfully"
        );
        Ok(())
    }
}
