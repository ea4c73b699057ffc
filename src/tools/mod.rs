//! Tools the model can call, gated by marketplace role

pub mod advisory;
mod handlers;
pub mod marketplace;
mod policy;
mod registry;

pub use advisory::{AdvisoryService, OpenMeteoAdvisory, Season};
pub use handlers::marketplace_registry;
pub use marketplace::{HttpMarketplace, MarketplaceService, Outcome};
pub use policy::{RoleRequirement, SessionRole, UserContext};
pub use registry::{
    GENERIC_FAILURE_MESSAGE, ToolContext, ToolHandler, ToolRegistry, failure, success,
};
