//! revtun-agent: the site-side reverse tunnel agent
//!
//! The agent dials out from a site to a central proxy and keeps that one
//! authenticated session alive. The proxy cannot dial into the site's
//! network; instead it opens channels back over the agent's connection to
//! reach the site's control-plane API and arbitrary TCP endpoints the
//! site can see.

mod agent;
mod heartbeat;
mod proxy;
mod router;
pub mod verify;

pub use agent::Agent;
