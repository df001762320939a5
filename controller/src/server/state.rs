//! Server state

use std::sync::Arc;

use crate::app::state::FleetController;
use crate::server::auth::CallerAuthorizer;

/// Server state shared across handlers
pub struct ServerState {
    pub controller: Arc<FleetController>,
    pub authorizer: Arc<dyn CallerAuthorizer>,
}

impl ServerState {
    pub fn new(controller: Arc<FleetController>, authorizer: Arc<dyn CallerAuthorizer>) -> Self {
        Self {
            controller,
            authorizer,
        }
    }
}
