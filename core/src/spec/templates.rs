//! Embedded spec templates for `project.init`.

use std::path::Path;

use super::loader::SpecError;

const BASIC_TEMPLATE: &str = r#"apiVersion: agentrun/v1
kind: ProjectSpec
meta:
  name: my-project
  description: Describe what this project does
  created: "{{date}}"
goal: |
  State the goal in one or two sentences.
constraints:
  - Only touch files under the workspace
success_criteria:
  - type: not_empty
    target: output
allowed_commands:
  - "fs:*"
output:
  path: ./output.md
  format: markdown
"#;

const REPORT_TEMPLATE: &str = r###"apiVersion: agentrun/v1
kind: ProjectSpec
meta:
  name: weekly-report
  description: Summarize recent activity into a report
  created: "{{date}}"
goal: |
  Collect the relevant data and write a concise weekly report.
guidelines:
  - Keep the report under one page
success_criteria:
  - type: not_empty
    target: output
  - type: contains
    target: output
    expected: "## Summary"
allowed_commands:
  - "fs:read"
  - "fs:list"
  - "fs:write"
output:
  path: ./reports/weekly-{{date}}.md
  format: markdown
params:
  - name: audience
    type: string
    default: team
    description: Who the report is written for
"###;

const TEMPLATES: [(&str, &str); 2] = [("basic", BASIC_TEMPLATE), ("report", REPORT_TEMPLATE)];

/// Names of the embedded templates.
pub fn template_names() -> Vec<&'static str> {
    TEMPLATES.iter().map(|(name, _)| *name).collect()
}

/// Write a named template to the destination path, creating parent
/// directories as needed. Template variables are left for load time.
pub fn scaffold_template(name: &str, dest: &Path) -> Result<(), SpecError> {
    let Some((_, body)) = TEMPLATES.iter().find(|(n, _)| *n == name) else {
        return Err(SpecError::UnknownTemplate {
            name: name.to_string(),
            known: template_names().join(", "),
        });
    };

    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| SpecError::TemplateWrite {
            path: dest.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(dest, body).map_err(|source| SpecError::TemplateWrite {
        path: dest.to_path_buf(),
        source,
    })
}
