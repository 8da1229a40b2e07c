// milkflow/src/core/step.rs
use super::ContextData;
use std::sync::Arc;

/// Predicate evaluated right before a step runs. `true` skips the step.
pub type SkipCondition<TData> = Arc<dyn Fn(ContextData<TData>) -> bool + Send + Sync + 'static>;

#[derive(Clone)]
pub struct StepDef<T: Send + Sync + 'static> {
  pub name: String,
  /// Optional steps may have no handlers, and a failing handler in an optional
  /// step is logged and the pipeline moves on to the next step.
  pub optional: bool,
  pub skip_if: Option<SkipCondition<T>>,
}

impl<T: Send + Sync + 'static> StepDef<T> {
  pub fn required(name: impl Into<String>) -> Self {
    Self { name: name.into(), optional: false, skip_if: None }
  }

  pub fn optional(name: impl Into<String>) -> Self {
    Self { name: name.into(), optional: true, skip_if: None }
  }

  pub fn skip_when(mut self, cond: impl Fn(ContextData<T>) -> bool + Send + Sync + 'static) -> Self {
    self.skip_if = Some(Arc::new(cond));
    self
  }

  pub(crate) fn should_skip(&self, ctx: &ContextData<T>) -> bool {
    self.skip_if.as_ref().is_some_and(|cond| cond(ctx.clone()))
  }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for StepDef<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDef")
      .field("name", &self.name)
      .field("optional", &self.optional)
      .field("has_skip_if", &self.skip_if.is_some())
      .finish()
  }
}
