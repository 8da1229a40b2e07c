// dairy_storefront/src/web/handlers/mod.rs

pub mod admin_handlers;
pub mod delivery_handlers;
pub mod order_handlers;
pub mod payment_handlers;
pub mod product_handlers;
pub mod refund_handlers;
pub mod subscription_handlers;

use crate::errors::AppError;
use crate::state::AppState;
use milkflow::{ContextData, PipelineResult};
use tracing::warn;

/// Runs the pipeline registered for `T` and treats an early stop as a failure:
/// none of the storefront pipelines stop on success.
pub(crate) async fn run_workflow<T>(app_state: &AppState, ctx: ContextData<T>) -> Result<(), AppError>
where
  T: Send + Sync + 'static,
{
  match app_state.workflows.run(ctx).await {
    Ok(PipelineResult::Completed) => Ok(()),
    Ok(PipelineResult::Stopped) => {
      warn!(context_type = %std::any::type_name::<T>(), "Workflow stopped before completing.");
      Err(AppError::Internal("Request processing stopped unexpectedly".to_string()))
    }
    Err(e) => Err(e),
  }
}

/// Pulls a result out of a finished pipeline context.
pub(crate) fn take_result<T, R>(ctx: &ContextData<T>, pick: impl FnOnce(&mut T) -> Option<R>) -> Result<R, AppError>
where
  T: Send + Sync + 'static,
{
  ctx
    .update(pick)
    .ok_or_else(|| AppError::Internal("Workflow completed without producing a result".to_string()))
}
