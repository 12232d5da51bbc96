//! Route service: profile selection in front of the ranker.

use std::time::Duration;

use tracing::{debug, warn};

use crate::event::RouteEvent;

use super::context::{CallContext, FilterContext, MetricSnapshot};
use super::error::{NotFoundReason, RankError};
use super::profile::RouteProfile;
use super::ranker::{RankOptions, RouteRanker};
use super::sorted::SortedRoutesList;

/// Selects the profiles applying to an event and ranks their routes.
pub struct RouteService {
    ranker: RouteRanker,
    profiles: Vec<RouteProfile>,
    default_tenant: String,
    defaults: RankOptions,
    rank_timeout: Option<Duration>,
}

impl RouteService {
    /// Create a service over a profile set.
    pub fn new(ranker: RouteRanker, profiles: Vec<RouteProfile>) -> Self {
        debug!(profiles = profiles.len(), "route service created");
        Self {
            ranker,
            profiles,
            default_tenant: String::new(),
            defaults: RankOptions::default(),
            rank_timeout: None,
        }
    }

    /// Tenant used for events that carry none.
    pub fn with_default_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.default_tenant = tenant.into();
        self
    }

    /// Options applied when the caller leaves them unset.
    pub fn with_default_options(mut self, defaults: RankOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Deadline applied to calls whose context has none.
    pub fn with_rank_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.rank_timeout = timeout;
        self
    }

    /// Configured profiles.
    pub fn profiles(&self) -> &[RouteProfile] {
        &self.profiles
    }

    /// The ranker.
    pub fn ranker(&self) -> &RouteRanker {
        &self.ranker
    }

    /// Profiles applying to `event`, highest weight first.
    pub async fn profiles_for_event(
        &self,
        ctx: &CallContext,
        event: &RouteEvent,
    ) -> Result<Vec<&RouteProfile>, RankError> {
        let scoped = self.scoped_context(ctx);
        let ctx = scoped.as_ref().unwrap_or(ctx);
        let snapshot = self.ranker.snapshot(ctx);
        self.matching_profiles(&snapshot, event).await
    }

    /// Ranked routes of every profile applying to `event`.
    ///
    /// `opts` override the configured defaults field by field.
    pub async fn routes_for_event(
        &self,
        ctx: &CallContext,
        event: &RouteEvent,
        opts: Option<&RankOptions>,
    ) -> Result<SortedRoutesList, RankError> {
        let scoped = self.scoped_context(ctx);
        let ctx = scoped.as_ref().unwrap_or(ctx);
        let opts = opts.cloned().unwrap_or_default().merged_over(&self.defaults);

        let snapshot = self.ranker.snapshot(ctx);
        let profiles = self.matching_profiles(&snapshot, event).await?;
        self.ranker.rank_with(&snapshot, event, &profiles, &opts).await
    }

    fn scoped_context(&self, ctx: &CallContext) -> Option<CallContext> {
        match (self.rank_timeout, ctx.deadline()) {
            (Some(timeout), None) => Some(ctx.clone().with_timeout(timeout)),
            _ => None,
        }
    }

    async fn matching_profiles<'s>(
        &'s self,
        snapshot: &MetricSnapshot<'_>,
        event: &RouteEvent,
    ) -> Result<Vec<&'s RouteProfile>, RankError> {
        let ctx = snapshot.context();
        let tenant = if event.tenant.is_empty() {
            self.default_tenant.as_str()
        } else {
            event.tenant.as_str()
        };
        let fctx = FilterContext::new(event, snapshot);

        let mut matched = Vec::new();
        for profile in self.profiles.iter().filter(|p| p.tenant == tenant) {
            ctx.check()?;

            if !profile.is_active_at(event.time) {
                debug!(profile = %profile.id, "profile not active");
                continue;
            }
            if !profile.filter_ids.is_empty() {
                match self.ranker.filters().matches(&fctx, &profile.filter_ids).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(profile = %profile.id, "profile filtered out");
                        continue;
                    }
                    Err(err) => {
                        ctx.check()?;
                        warn!(
                            profile = %profile.id,
                            error = %err,
                            "skipping profile: filter evaluation failed"
                        );
                        continue;
                    }
                }
            }
            matched.push(profile);
        }

        if matched.is_empty() {
            return Err(RankError::NotFound(NotFoundReason::NoProfiles));
        }
        matched.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        Ok(matched)
    }
}
