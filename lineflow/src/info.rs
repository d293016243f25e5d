//! Pipeline and component identity for tracking step executions.
//!
//! Context names are stable functions of these identities, which is what
//! makes context registration idempotent: the same pipeline / run /
//! component always derives the same context name.

use serde::{Deserialize, Serialize};

/// Identifies a pipeline and, optionally, one run of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineInfo {
    /// The name of the pipeline.
    pub pipeline_name: String,

    /// The root location under which the pipeline stores its outputs.
    pub pipeline_root: String,

    /// The id of the current run, when the pipeline runs in run-scoped
    /// mode. Absent for runless invocations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl PipelineInfo {
    /// Creates a pipeline identity without a run id.
    #[must_use]
    pub fn new(pipeline_name: impl Into<String>, pipeline_root: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            pipeline_root: pipeline_root.into(),
            run_id: None,
        }
    }

    /// Sets the run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Context name for the pipeline-level context.
    #[must_use]
    pub fn pipeline_context_name(&self) -> &str {
        &self.pipeline_name
    }

    /// Context name for the pipeline-run-level context, when a run id is
    /// present.
    #[must_use]
    pub fn pipeline_run_context_name(&self) -> Option<String> {
        self.run_id
            .as_ref()
            .map(|run_id| format!("{}.{run_id}", self.pipeline_name))
    }
}

/// Identifies one component (step) of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    /// The type name of the component; doubles as the execution type name.
    pub component_type: String,

    /// The unique id of the component within its pipeline.
    pub component_id: String,
}

impl ComponentInfo {
    /// Creates a new component identity.
    #[must_use]
    pub fn new(component_type: impl Into<String>, component_id: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            component_id: component_id.into(),
        }
    }

    /// Context name for the component-run-level context.
    ///
    /// Scoped under the pipeline-run context name when the pipeline has a
    /// run id, else under the pipeline context name.
    #[must_use]
    pub fn component_run_context_name(&self, pipeline_info: &PipelineInfo) -> String {
        match pipeline_info.pipeline_run_context_name() {
            Some(run_context) => format!("{run_context}.{}", self.component_id),
            None => format!(
                "{}.{}",
                pipeline_info.pipeline_context_name(),
                self.component_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_context_name() {
        let info = PipelineInfo::new("p1", "/data/p1");
        assert_eq!(info.pipeline_context_name(), "p1");
    }

    #[test]
    fn test_pipeline_run_context_name() {
        let info = PipelineInfo::new("p1", "/data/p1").with_run_id("r1");
        assert_eq!(info.pipeline_run_context_name(), Some("p1.r1".to_string()));
    }

    #[test]
    fn test_pipeline_run_context_name_without_run() {
        let info = PipelineInfo::new("p1", "/data/p1");
        assert_eq!(info.pipeline_run_context_name(), None);
    }

    #[test]
    fn test_component_run_context_name() {
        let pipeline = PipelineInfo::new("p1", "/data/p1").with_run_id("r1");
        let component = ComponentInfo::new("Trainer", "c1");
        assert_eq!(
            component.component_run_context_name(&pipeline),
            "p1.r1.c1"
        );
    }

    #[test]
    fn test_component_run_context_name_without_run() {
        let pipeline = PipelineInfo::new("p1", "/data/p1");
        let component = ComponentInfo::new("Trainer", "c1");
        assert_eq!(component.component_run_context_name(&pipeline), "p1.c1");
    }

    #[test]
    fn test_context_names_are_stable() {
        let a = PipelineInfo::new("p1", "/data/p1").with_run_id("r1");
        let b = PipelineInfo::new("p1", "/other/root").with_run_id("r1");
        // The root does not participate in context naming.
        assert_eq!(a.pipeline_run_context_name(), b.pipeline_run_context_name());
    }
}
