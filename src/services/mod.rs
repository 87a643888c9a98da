pub mod cache;
pub mod ci;
pub mod deployment;
pub mod scheduler;
pub mod security;
pub mod session;
pub mod tokens;
pub mod tunnel;
pub mod undeploy;

pub use ci::{CiApi, GithubClient};
pub use deployment::DeploymentStatus;
pub use session::{PrincipalKind, SessionToken};
pub use tunnel::{TunnelAction, TunnelApi, TunnelClient};
pub use undeploy::{UndeployResult, UndeployTarget};
