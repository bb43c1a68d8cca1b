//! Task submitter: dispatch, then hand the returned ids to the poller.

use std::sync::Arc;
use tracing::{debug, warn};

use super::classify::RecoveryAction;
use super::manager::TaskManager;
use crate::dispatch::Dispatcher;
use crate::error::GenError;
use crate::types::{DispatchOutcome, GenerationRequest, ModelId};

/// A submission that produced task ids
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReceipt {
    pub outcome: DispatchOutcome,
    /// How many ids were new to the in-flight set
    pub added: usize,
}

/// A submission that failed, with the action the caller should take
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct SubmitRejection {
    pub action: RecoveryAction,
    #[source]
    pub error: GenError,
}

impl From<GenError> for SubmitRejection {
    fn from(error: GenError) -> Self {
        Self {
            action: error.recovery_action(),
            error,
        }
    }
}

/// Calls the dispatcher and records the resulting ids with the poller.
/// Submission only ever adds ids.
#[derive(Debug, Clone)]
pub struct TaskSubmitter {
    dispatcher: Arc<Dispatcher>,
    manager: TaskManager,
}

impl TaskSubmitter {
    pub fn new(dispatcher: Arc<Dispatcher>, manager: TaskManager) -> Self {
        Self {
            dispatcher,
            manager,
        }
    }

    pub fn manager(&self) -> &TaskManager {
        &self.manager
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn submit(
        &self,
        model_id: ModelId,
        request: GenerationRequest,
    ) -> Result<SubmitReceipt, SubmitRejection> {
        match self.dispatcher.dispatch(model_id, request).await {
            Ok(outcome) => {
                let added = self.manager.add_tasks(outcome.task_ids.iter().copied());
                debug!(
                    model = %outcome.model_id,
                    tasks = ?outcome.task_ids,
                    added,
                    "submission accepted"
                );
                Ok(SubmitReceipt { outcome, added })
            }
            Err(error) => {
                warn!(model = %model_id, error = %error, "submission rejected");
                Err(SubmitRejection::from(error))
            }
        }
    }
}
