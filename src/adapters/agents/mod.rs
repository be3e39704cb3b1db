//! ATS vendor agents.

pub mod captcha;
pub mod form;
pub mod generic;
pub mod greenhouse;
pub mod lever;

#[cfg(test)]
mod tests;

pub use captcha::{find_captcha_indicator, is_access_denied, CAPTCHA_INDICATORS};
pub use form::{AgentSettings, FieldSpec, FormAgent, FormLayout, ProfileField};
pub use generic::{GenericAgent, GENERIC_LAYOUT};
pub use greenhouse::{GreenhouseAgent, GREENHOUSE_LAYOUT};
pub use lever::{LeverAgent, LEVER_LAYOUT};
