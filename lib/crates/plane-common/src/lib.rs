pub mod config;
pub mod handshake;
pub mod types;

pub use config::HeartbeatConfig;
pub use handshake::{
    Effect, HandshakePolicy, HandshakeState, Observation, Transition, answers_prompt,
    extract_credential, matches_trigger, plan,
};
pub use types::*;
