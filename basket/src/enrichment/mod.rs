//! Attributes derived from the request itself rather than the beacon: where
//! it came from, what sent it, and whether that was a person.

pub mod bot;
pub mod geo;
pub mod user_agent;

pub use bot::{detect_bot, BotCheck};
pub use geo::{anonymize_ip, Geo, GeoResolver};
pub use user_agent::{parse_user_agent, UserAgentInfo};
