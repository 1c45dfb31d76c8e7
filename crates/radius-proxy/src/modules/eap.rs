//! `eap` module
//!
//! Follows an EAP exchange across the Access-Request rounds of one device.
//! The state is keyed by the request's session key and advanced once per
//! request carrying an EAP-Message.
//!
//! Placed after `proxy`, the module also sees the upstream reply: an
//! Access-Challenge keeps the exchange open, an Access-Accept or
//! Access-Reject ends it and clears the state. Placed before `proxy` it only
//! records the request side.

use crate::pipeline::registry::parse_module_config;
use crate::pipeline::{Module, ModuleError, ModuleOutcome, ModuleServices, PipelineError, RequestContext};
use crate::state::{AuthState, AuthStateStore, StateLookup};
use async_trait::async_trait;
use radius_proto::{Code, EapCode, EapPacket, EapType};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const NAME: &str = "eap";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EapModuleConfig {
    /// Rounds allowed before the exchange is rejected
    #[serde(default = "default_max_rounds")]
    max_rounds: u32,
}

fn default_max_rounds() -> u32 {
    50
}

impl Default for EapModuleConfig {
    fn default() -> Self {
        EapModuleConfig {
            max_rounds: default_max_rounds(),
        }
    }
}

pub struct EapModule {
    state: Arc<AuthStateStore>,
    max_rounds: u32,
}

impl EapModule {
    pub fn new(state: Arc<AuthStateStore>, max_rounds: u32) -> Self {
        EapModule { state, max_rounds }
    }

    pub fn build(config: &Value, services: &ModuleServices) -> Result<Arc<dyn Module>, PipelineError> {
        let config: EapModuleConfig = parse_module_config(NAME, config)?;
        if config.max_rounds == 0 {
            return Err(PipelineError::invalid_config(NAME, "maxRounds must be greater than zero"));
        }
        Ok(Arc::new(EapModule::new(Arc::clone(&services.state), config.max_rounds)))
    }
}

/// Method types that never settle the negotiated method
fn is_negotiation(type_code: u8) -> bool {
    [EapType::Identity, EapType::Notification, EapType::Nak]
        .iter()
        .any(|t| t.as_u8() == type_code)
}

fn record(state: &mut AuthState, eap: &EapPacket) {
    state.last_identifier = Some(eap.identifier);
    if let Some(type_code) = eap.type_code {
        if !is_negotiation(type_code) {
            state.eap_type = Some(type_code);
        }
    }
}

#[async_trait]
impl Module for EapModule {
    fn name(&self) -> &str {
        NAME
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<ModuleOutcome, ModuleError> {
        let eap = match EapPacket::from_radius(ctx.request()) {
            None => return Ok(ModuleOutcome::Continue),
            Some(Ok(eap)) => eap,
            Some(Err(e)) => {
                debug!(listener = %ctx.listener(), session_key = %ctx.session_key(), error = %e, "Malformed EAP-Message");
                return Ok(ModuleOutcome::Reject(format!("malformed EAP-Message: {}", e)));
            }
        };

        let key = ctx.session_key().as_str().to_string();

        let mut state = match self.state.get(&key).await {
            Ok(StateLookup::Found(state)) => state,
            Ok(StateLookup::NotFound) => AuthState::default(),
            Ok(StateLookup::Invalid) => {
                warn!(session_key = %key, "Discarding unreadable EAP state, starting a new exchange");
                AuthState::default()
            }
            Err(e) => return Err(ModuleError::abort(format!("EAP state unavailable: {}", e))),
        };

        // A fresh identity response restarts the exchange
        if eap.code == EapCode::Response && eap.eap_type() == Some(EapType::Identity) {
            state = AuthState::default();
        }

        record(&mut state, &eap);
        state.rounds += 1;

        if state.rounds > self.max_rounds {
            warn!(
                session_key = %key,
                rounds = state.rounds,
                max_rounds = self.max_rounds,
                "EAP exchange exceeded the round limit"
            );
            if let Err(e) = self.state.reset(&key).await {
                warn!(session_key = %key, error = %e, "Failed to reset EAP state");
            }
            return Ok(ModuleOutcome::Reject(format!(
                "EAP exchange exceeded {} rounds",
                self.max_rounds
            )));
        }

        let reply_code = ctx.response.as_ref().map(|response| response.packet.code);
        let stored = match reply_code {
            Some(Code::AccessAccept) | Some(Code::AccessReject) => {
                debug!(session_key = %key, rounds = state.rounds, "EAP exchange finished");
                self.state.reset(&key).await
            }
            Some(Code::AccessChallenge) => {
                if let Some(Ok(challenge)) = ctx
                    .response
                    .as_ref()
                    .and_then(|response| EapPacket::from_radius(&response.packet))
                {
                    record(&mut state, &challenge);
                }
                self.state.set(&key, &state).await
            }
            _ => self.state.set(&key, &state).await,
        };

        // The reply is still worth sending; the next round starts over if needed
        stored.map_err(|e| ModuleError::continue_with(format!("EAP state not saved: {}", e)))?;

        Ok(ModuleOutcome::Continue)
    }
}
