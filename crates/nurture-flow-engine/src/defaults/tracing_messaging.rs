//! Messaging gateway that only logs. Hosts replace it with a real channel.

use async_trait::async_trait;

use crate::errors::MessagingError;
use crate::traits::{MessagingGateway, OutboundMessage};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMessagingGateway;

#[async_trait]
impl MessagingGateway for TracingMessagingGateway {
    async fn send(&self, message: &OutboundMessage) -> Result<(), MessagingError> {
        tracing::info!(
            team_id = %message.team_id,
            contact_id = %message.contact_id,
            flow_id = %message.flow_id,
            execution_id = %message.execution_id,
            node_id = %message.node_id,
            chars = message.content.chars().count(),
            "outbound message"
        );
        Ok(())
    }
}
