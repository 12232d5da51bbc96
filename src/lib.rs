//! lcrd: route sorting and least-cost routing.
//!
//! Ranks the candidate routes of an event across route profiles, each
//! profile sorted by its own strategy (`*weight`, `*lc`, `*hc`, `*qos`,
//! `*reas`, `*reds`, `*load`), using live signals from external cost,
//! stats, resource and filter providers.

pub mod config;
pub mod event;
pub mod filters;
pub mod providers;
pub mod routes;
pub mod telemetry;

pub use event::RouteEvent;
pub use routes::{
    CallContext, RankError, RankOptions, RouteProfile, RouteRanker, RouteService, SortedRoutesList,
};
