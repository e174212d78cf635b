//! Declarative project specs: schema, loader, validator, planner, templates.

mod loader;
mod model;
mod planner;
mod templates;
mod validator;

pub use loader::{load_spec, parse_spec, SpecError, API_VERSION};
pub use model::{OutputSpec, ParamDef, ProjectSpec, SpecMeta, SPEC_KIND};
pub use planner::{
    generate_plan, CommandLister, ExecutionPlan, OnError, PlanStep, Risk, OUTPUT_WRITE_COMMAND,
};
pub use templates::{scaffold_template, template_names};
pub use validator::{validate_spec, ValidationIssue, ValidationResult};
