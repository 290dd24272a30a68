//! Server status polling.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::debug;

use crate::api::{ComputeApi, NodeStatus, ServerRecord};
use crate::error::ComputeError;
use crate::types::Region;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const NODE_RUNNING_TIMEOUT: Duration = Duration::from_secs(300);

/// Interval and deadline for waiting on a server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollConfig {
    /// Delay between status reads.
    pub interval: Duration,
    /// Time allowed for a server to become active.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            timeout: NODE_RUNNING_TIMEOUT,
        }
    }
}

/// Polls `server_id` until it is active, failed, or the deadline passes.
///
/// A server the provider does not show yet is treated as still building.
/// Nothing is deleted when the deadline passes. A timeout too large to
/// represent as an instant means no deadline.
pub(super) async fn wait_for_active(
    api: &dyn ComputeApi,
    region: &Region,
    node: &str,
    server_id: &str,
    poll: PollConfig,
) -> Result<ServerRecord, ComputeError> {
    let deadline = Instant::now().checked_add(poll.timeout);

    while deadline.is_none_or(|limit| Instant::now() <= limit) {
        let Some(server) = api.get_server(region, server_id).await? else {
            debug!(%region, node, server_id, "server not visible yet");
            sleep(poll.interval).await;
            continue;
        };

        match server.status {
            NodeStatus::Active => return Ok(server),
            NodeStatus::Error | NodeStatus::Deleted => {
                return Err(ComputeError::RemoteStatus {
                    server_id: server_id.to_owned(),
                    status: server.provider_status,
                });
            }
            NodeStatus::Building | NodeStatus::Unknown => {
                debug!(%region, node, server_id, status = %server.provider_status, "waiting for server");
            }
        }
        sleep(poll.interval).await;
    }

    Err(ComputeError::ProvisioningTimeout {
        node: node.to_owned(),
        server_id: server_id.to_owned(),
    })
}
