pub mod auth;
pub mod gateway;
pub mod pipeline;
pub mod proxy;
pub mod rate_limiter;
pub mod router;
pub mod stages;

pub use auth::{AuthError, Identity, TokenValidator};
pub use gateway::GatewayService;
pub use pipeline::{Flow, Pipeline, RequestContext, Stage};
pub use rate_limiter::FixedWindowLimiter;
pub use router::{ResolvedRoute, RouteError, RouteTable};
