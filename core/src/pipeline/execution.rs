// milkflow/src/pipeline/execution.rs
use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::error::FlowError;
use crate::pipeline::definition::{Phase, Pipeline};
use tracing::{debug, error, info_span, instrument, trace, warn, Instrument};

enum StepOutcome {
  Continue,
  Stop,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: Send + Sync + 'static,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Runs every step in order against `ctx_data`.
  ///
  /// A non-optional step without handlers fails with [`FlowError::HandlerMissing`].
  /// An error from a required step aborts the run. An error from an optional
  /// step is logged and the run continues with the next step.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(context_type = %std::any::type_name::<TData>(), num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    if let Some(step_name) = self.unknown_hooks.first() {
      return Err(Err::from(FlowError::StepNotFound { step_name: step_name.clone() }));
    }

    for (step_idx, step) in self.steps.iter().enumerate() {
      let span = info_span!("step", step_name = %step.name, step_index = step_idx, optional = step.optional);

      if step.should_skip(&ctx_data) {
        span.in_scope(|| debug!("Skipped by condition."));
        continue;
      }

      let Some(handlers) = self.handlers.get(&step.name).filter(|h| !h.is_empty()) else {
        if step.optional {
          span.in_scope(|| trace!("Optional step has no handlers."));
          continue;
        }
        span.in_scope(|| error!("Required step has no handlers."));
        return Err(Err::from(FlowError::HandlerMissing { step_name: step.name.clone() }));
      };

      let outcome = async {
        for phase in Phase::ALL {
          for handler in handlers.phase(phase) {
            match handler(ctx_data.clone()).await {
              Ok(PipelineControl::Continue) => {}
              Ok(PipelineControl::Stop) => {
                debug!(phase = phase.as_str(), "Stopped by handler.");
                return Ok(StepOutcome::Stop);
              }
              Err(e) if step.optional => {
                warn!(phase = phase.as_str(), error = %e, "Optional step failed; continuing.");
                return Ok(StepOutcome::Continue);
              }
              Err(e) => {
                debug!(phase = phase.as_str(), error = %e, "Handler failed.");
                return Err(e);
              }
            }
          }
        }
        Ok(StepOutcome::Continue)
      }
      .instrument(span)
      .await?;

      if let StepOutcome::Stop = outcome {
        return Ok(PipelineResult::Stopped);
      }
    }

    Ok(PipelineResult::Completed)
  }
}
